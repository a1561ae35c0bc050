use crate::Database;
use crate::models::{MatchRow, MessageRow, UserRow, pair_key};
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use uuid::Uuid;

impl Database {
    // -- Users --

    #[allow(clippy::too_many_arguments)]
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        display_name: &str,
        age: u32,
        gender: &str,
        bio: &str,
        interested_in: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, display_name, age, gender, bio, interested_in)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![id, email, password_hash, display_name, age, gender, bio, interested_in],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn update_preferences(
        &self,
        id: &str,
        age_min: u32,
        age_max: u32,
        interested_in: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET age_min = ?2, age_max = ?3, interested_in = ?4 WHERE id = ?1",
                rusqlite::params![id, age_min, age_max, interested_in],
            )?;
            if updated == 0 {
                return Err(anyhow!("User not found: {}", id));
            }
            Ok(())
        })
    }

    /// Candidate list for discovery: in the caller's age window, excluding
    /// the caller and everyone they already liked, disliked, or matched.
    /// Interested-in gender filtering happens in the caller, which owns the
    /// JSON preference fields.
    pub fn discover_candidates(
        &self,
        user_id: &str,
        age_min: u32,
        age_max: u32,
        limit: u32,
    ) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLS} FROM users u
                 WHERE u.id <> ?1
                   AND u.age BETWEEN ?2 AND ?3
                   AND u.id NOT IN (SELECT target_id FROM likes WHERE user_id = ?1)
                   AND u.id NOT IN (SELECT target_id FROM dislikes WHERE user_id = ?1)
                   AND u.id NOT IN (SELECT other_id FROM matched WHERE user_id = ?1)
                 ORDER BY u.created_at DESC
                 LIMIT ?4",
            ))?;

            let rows = stmt
                .query_map(
                    rusqlite::params![user_id, age_min, age_max, limit],
                    map_user_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Interest sets --

    /// Add `target` to `user`'s like set. Repeated calls are no-ops.
    pub fn record_like(&self, user_id: &str, target_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO likes (user_id, target_id) VALUES (?1, ?2)",
                (user_id, target_id),
            )?;
            Ok(())
        })
    }

    /// Add `target` to `user`'s dislike set. Repeated calls are no-ops.
    pub fn record_dislike(&self, user_id: &str, target_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO dislikes (user_id, target_id) VALUES (?1, ?2)",
                (user_id, target_id),
            )?;
            Ok(())
        })
    }

    pub fn has_liked(&self, user_id: &str, target_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM likes WHERE user_id = ?1 AND target_id = ?2)",
                (user_id, target_id),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    // -- Matches --

    /// Form a match between `a` and `b`: one transaction writing the match
    /// row plus both directions of the per-user match sets. Returns the row
    /// and whether this call created it: a UNIQUE violation on the pair key
    /// means a concurrent (or earlier) formation won, and the existing row
    /// is returned with `created = false`.
    pub fn create_match(
        &self,
        id: &str,
        a: &Uuid,
        b: &Uuid,
        matched_at: &str,
    ) -> Result<(MatchRow, bool)> {
        self.with_conn_mut(|conn| {
            let pair = pair_key(a, b);
            let (a, b) = (a.to_string(), b.to_string());

            let tx = conn.transaction()?;
            let inserted = match tx.execute(
                "INSERT INTO matches (id, pair_key, user_a, user_b, matched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, pair, a, b, matched_at],
            ) {
                Ok(_) => true,
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    false
                }
                Err(e) => return Err(e.into()),
            };

            if inserted {
                tx.execute(
                    "INSERT INTO matched (user_id, other_id, match_id) VALUES (?1, ?2, ?3)",
                    rusqlite::params![a, b, id],
                )?;
                tx.execute(
                    "INSERT INTO matched (user_id, other_id, match_id) VALUES (?1, ?2, ?3)",
                    rusqlite::params![b, a, id],
                )?;
                tx.commit()?;
            } else {
                drop(tx);
            }

            let row = query_match_by_pair(conn, &pair)?
                .ok_or_else(|| anyhow!("No match row for pair {}", pair))?;
            Ok((row, inserted))
        })
    }

    pub fn get_match(&self, id: &str) -> Result<Option<MatchRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {MATCH_COLS} FROM matches m WHERE m.id = ?1"))?;
            let row = stmt.query_row([id], map_match_row).optional()?;
            Ok(row)
        })
    }

    /// Active matches for a user, newest first, each joined with the other
    /// participant's profile row.
    pub fn list_matches_for(&self, user_id: &str) -> Result<Vec<(MatchRow, UserRow)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATCH_COLS}, {USER_COLS} FROM matched md
                 JOIN matches m ON m.id = md.match_id
                 JOIN users u ON u.id = md.other_id
                 WHERE md.user_id = ?1 AND m.is_active = 1
                 ORDER BY m.matched_at DESC",
            ))?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok((map_match_row(row)?, map_user_row_at(row, 9)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Soft-unmatch: deactivate the match row and clear both per-user match
    /// set entries, atomically.
    pub fn deactivate_match(&self, match_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE matches SET is_active = 0 WHERE id = ?1",
                [match_id],
            )?;
            tx.execute("DELETE FROM matched WHERE match_id = ?1", [match_id])?;
            tx.commit()?;
            Ok(())
        })
    }

    // -- Messages --

    /// Append a message and refresh the match's last-message cache in one
    /// transaction. Returns `None`, with nothing written, when the match
    /// is gone or no longer active by the time the transaction runs.
    pub fn append_message(
        &self,
        match_id: &str,
        message_id: &str,
        sender_id: &str,
        content: &str,
        sent_at: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let active: Option<bool> = tx
                .query_row(
                    "SELECT is_active FROM matches WHERE id = ?1",
                    [match_id],
                    |row| row.get(0),
                )
                .optional()?;
            if active != Some(true) {
                return Ok(None);
            }

            let seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE match_id = ?1",
                [match_id],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT INTO messages (id, match_id, seq, sender_id, content, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![message_id, match_id, seq, sender_id, content, sent_at],
            )?;
            tx.execute(
                "UPDATE matches
                 SET last_message_content = ?2, last_message_sender = ?3, last_message_at = ?4
                 WHERE id = ?1",
                rusqlite::params![match_id, content, sender_id, sent_at],
            )?;
            tx.commit()?;

            Ok(Some(MessageRow {
                id: message_id.to_string(),
                match_id: match_id.to_string(),
                seq,
                sender_id: sender_id.to_string(),
                content: content.to_string(),
                sent_at: sent_at.to_string(),
                is_read: false,
            }))
        })
    }

    /// Full ordered message log for a match.
    pub fn list_messages(&self, match_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, match_id, seq, sender_id, content, sent_at, is_read
                 FROM messages WHERE match_id = ?1
                 ORDER BY seq",
            )?;

            let rows = stmt
                .query_map([match_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        match_id: row.get(1)?,
                        seq: row.get(2)?,
                        sender_id: row.get(3)?,
                        content: row.get(4)?,
                        sent_at: row.get(5)?,
                        is_read: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

const USER_COLS: &str = "u.id, u.email, u.password, u.display_name, u.age, u.gender, \
                         u.bio, u.photos, u.interested_in, u.age_min, u.age_max, u.created_at";

const MATCH_COLS: &str = "m.id, m.pair_key, m.user_a, m.user_b, m.matched_at, m.is_active, \
                          m.last_message_content, m.last_message_sender, m.last_message_at";

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLS} FROM users u WHERE u.{column} = ?1"
    ))?;
    let row = stmt.query_row([value], map_user_row).optional()?;
    Ok(row)
}

fn query_match_by_pair(conn: &Connection, pair: &str) -> Result<Option<MatchRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MATCH_COLS} FROM matches m WHERE m.pair_key = ?1"
    ))?;
    let row = stmt.query_row([pair], map_match_row).optional()?;
    Ok(row)
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    map_user_row_at(row, 0)
}

fn map_user_row_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(base)?,
        email: row.get(base + 1)?,
        password: row.get(base + 2)?,
        display_name: row.get(base + 3)?,
        age: row.get(base + 4)?,
        gender: row.get(base + 5)?,
        bio: row.get(base + 6)?,
        photos: row.get(base + 7)?,
        interested_in: row.get(base + 8)?,
        age_min: row.get(base + 9)?,
        age_max: row.get(base + 10)?,
        created_at: row.get(base + 11)?,
    })
}

fn map_match_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(0)?,
        pair_key: row.get(1)?,
        user_a: row.get(2)?,
        user_b: row.get(3)?,
        matched_at: row.get(4)?,
        is_active: row.get(5)?,
        last_message_content: row.get(6)?,
        last_message_sender: row.get(7)?,
        last_message_at: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_user(db: &Database, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(
            &id.to_string(),
            &format!("{}@example.com", name),
            "hash",
            name,
            25,
            "other",
            "",
            "[]",
        )
        .unwrap();
        id
    }

    #[test]
    fn record_like_is_idempotent() {
        let db = db();
        let a = add_user(&db, "a");
        let b = add_user(&db, "b");

        db.record_like(&a.to_string(), &b.to_string()).unwrap();
        db.record_like(&a.to_string(), &b.to_string()).unwrap();

        assert!(db.has_liked(&a.to_string(), &b.to_string()).unwrap());
        assert!(!db.has_liked(&b.to_string(), &a.to_string()).unwrap());
    }

    #[test]
    fn at_most_one_match_per_pair() {
        let db = db();
        let a = add_user(&db, "a");
        let b = add_user(&db, "b");

        let first = Uuid::new_v4().to_string();
        let (row, created) = db
            .create_match(&first, &a, &b, "2026-01-01T00:00:00Z")
            .unwrap();
        assert!(created);
        assert_eq!(row.id, first);

        // Second formation with operands reversed must surface the winner's row
        let second = Uuid::new_v4().to_string();
        let (row, created) = db
            .create_match(&second, &b, &a, "2026-01-01T00:00:01Z")
            .unwrap();
        assert!(!created);
        assert_eq!(row.id, first);
    }

    #[test]
    fn formation_writes_both_match_set_rows() {
        let db = db();
        let a = add_user(&db, "a");
        let b = add_user(&db, "b");

        let id = Uuid::new_v4().to_string();
        db.create_match(&id, &a, &b, "2026-01-01T00:00:00Z").unwrap();

        let for_a = db.list_matches_for(&a.to_string()).unwrap();
        let for_b = db.list_matches_for(&b.to_string()).unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_a[0].1.id, b.to_string());
        assert_eq!(for_b[0].1.id, a.to_string());
    }

    #[test]
    fn deactivation_clears_both_match_set_rows() {
        let db = db();
        let a = add_user(&db, "a");
        let b = add_user(&db, "b");

        let id = Uuid::new_v4().to_string();
        db.create_match(&id, &a, &b, "2026-01-01T00:00:00Z").unwrap();
        db.deactivate_match(&id).unwrap();

        assert!(db.list_matches_for(&a.to_string()).unwrap().is_empty());
        assert!(db.list_matches_for(&b.to_string()).unwrap().is_empty());
        // The row itself survives, soft-deactivated
        let row = db.get_match(&id).unwrap().unwrap();
        assert!(!row.is_active);
    }

    #[test]
    fn append_assigns_sequential_order_and_caches_last_message() {
        let db = db();
        let a = add_user(&db, "a");
        let b = add_user(&db, "b");

        let id = Uuid::new_v4().to_string();
        db.create_match(&id, &a, &b, "2026-01-01T00:00:00Z").unwrap();

        let ts = "2026-01-01T00:00:02Z";
        for (i, text) in ["hi", "hey", "how are you"].iter().enumerate() {
            let msg = db
                .append_message(&id, &Uuid::new_v4().to_string(), &a.to_string(), text, ts)
                .unwrap()
                .unwrap();
            assert_eq!(msg.seq, i as i64 + 1);
        }

        let log = db.list_messages(&id).unwrap();
        assert_eq!(log.len(), 3);
        assert!(log.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(log[2].content, "how are you");

        let row = db.get_match(&id).unwrap().unwrap();
        assert_eq!(row.last_message_content.as_deref(), Some("how are you"));
        assert_eq!(row.last_message_sender.as_deref(), Some(a.to_string().as_str()));
    }

    #[test]
    fn append_refused_on_missing_or_inactive_match() {
        let db = db();
        let a = add_user(&db, "a");
        let b = add_user(&db, "b");

        let absent = db
            .append_message(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &a.to_string(),
                "hello?",
                "2026-01-01T00:00:00Z",
            )
            .unwrap();
        assert!(absent.is_none());

        let id = Uuid::new_v4().to_string();
        db.create_match(&id, &a, &b, "2026-01-01T00:00:00Z").unwrap();
        db.deactivate_match(&id).unwrap();

        let refused = db
            .append_message(
                &id,
                &Uuid::new_v4().to_string(),
                &a.to_string(),
                "too late",
                "2026-01-01T00:00:01Z",
            )
            .unwrap();
        assert!(refused.is_none());

        // Refusal left the last-message cache untouched
        let row = db.get_match(&id).unwrap().unwrap();
        assert!(row.last_message_content.is_none());
        assert!(db.list_messages(&id).unwrap().is_empty());
    }

    #[test]
    fn discover_excludes_self_and_already_seen() {
        let db = db();
        let me = add_user(&db, "me");
        let liked = add_user(&db, "liked");
        let disliked = add_user(&db, "disliked");
        let matched = add_user(&db, "matched");
        let fresh = add_user(&db, "fresh");

        db.record_like(&me.to_string(), &liked.to_string()).unwrap();
        db.record_dislike(&me.to_string(), &disliked.to_string())
            .unwrap();
        db.create_match(
            &Uuid::new_v4().to_string(),
            &me,
            &matched,
            "2026-01-01T00:00:00Z",
        )
        .unwrap();

        let candidates = db
            .discover_candidates(&me.to_string(), 18, 100, 20)
            .unwrap();
        let ids: Vec<&str> = candidates.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec![fresh.to_string().as_str()]);
    }
}
