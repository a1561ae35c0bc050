use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gender as declared on a profile and used by discovery filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::NonBinary => "non-binary",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "non-binary" => Some(Self::NonBinary),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// A user's profile as shown to other users: no email, no credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub display_name: String,
    pub age: u32,
    pub gender: Gender,
    pub bio: String,
    pub photos: Vec<String>,
}
