/// Database row types; these map directly to SQLite rows.
/// Distinct from ember-types API models to keep the DB layer independent.
use uuid::Uuid;

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub age: u32,
    pub gender: String,
    pub bio: String,
    pub photos: String,
    pub interested_in: String,
    pub age_min: u32,
    pub age_max: u32,
    pub created_at: String,
}

pub struct MatchRow {
    pub id: String,
    pub pair_key: String,
    pub user_a: String,
    pub user_b: String,
    pub matched_at: String,
    pub is_active: bool,
    pub last_message_content: Option<String>,
    pub last_message_sender: Option<String>,
    pub last_message_at: Option<String>,
}

impl MatchRow {
    pub fn involves(&self, user_id: &str) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The other participant, given one of the match's two users.
    pub fn other_user(&self, user_id: &str) -> Option<&str> {
        if self.user_a == user_id {
            Some(&self.user_b)
        } else if self.user_b == user_id {
            Some(&self.user_a)
        } else {
            None
        }
    }
}

pub struct MessageRow {
    pub id: String,
    pub match_id: String,
    pub seq: i64,
    pub sender_id: String,
    pub content: String,
    pub sent_at: String,
    pub is_read: bool,
}

/// Canonical unordered pair key: the two ids sorted lexicographically and
/// joined with ':'. Both orderings of a pair produce the same key.
pub fn pair_key(a: &Uuid, b: &Uuid) -> String {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}
