use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use ember_db::Database;
use ember_db::models::{MatchRow, MessageRow, UserRow};
use ember_types::api::{LastMessage, MatchSummary, MessageResponse};
use ember_types::events::{EventSink, GatewayEvent};
use ember_types::models::{Gender, PublicProfile};

use crate::error::EngineError;

/// Bounded retry for the formation transaction when storage reports busy.
const FORMATION_RETRIES: u32 = 3;

pub const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

/// Outcome of a like: either the pair is now mutual and a match exists, or
/// the like was recorded and nothing else changed.
#[derive(Debug)]
pub struct LikeOutcome {
    pub matched: bool,
    pub match_summary: Option<MatchSummary>,
}

/// The match engine. Validates, records interest, detects mutual likes,
/// runs the formation transaction, and emits gateway events through the
/// injected sink. Blocking storage work runs off the async runtime.
#[derive(Clone)]
pub struct MatchEngine {
    db: Arc<Database>,
    sink: Arc<dyn EventSink>,
    max_message_len: usize,
}

enum Formation {
    NotMutual,
    Formed {
        row: MatchRow,
        created: bool,
        actor_profile: PublicProfile,
        target_profile: PublicProfile,
    },
}

impl MatchEngine {
    pub fn new(db: Arc<Database>, sink: Arc<dyn EventSink>, max_message_len: usize) -> Self {
        Self {
            db,
            sink,
            max_message_len,
        }
    }

    /// Record a like and form a match if `target` already liked `actor`.
    /// On a newly formed match, `MatchCreated` is pushed to both
    /// participants; push failure never rolls back the formation.
    pub async fn like(&self, actor: Uuid, target: Uuid) -> Result<LikeOutcome, EngineError> {
        if actor == target {
            return Err(EngineError::Forbidden("cannot like yourself"));
        }

        let db = self.db.clone();
        let formed =
            tokio::task::spawn_blocking(move || like_blocking(&db, actor, target))
                .await
                .map_err(|e| EngineError::Storage(anyhow!("join error: {}", e)))??;

        match formed {
            Formation::NotMutual => Ok(LikeOutcome {
                matched: false,
                match_summary: None,
            }),
            Formation::Formed {
                row,
                created,
                actor_profile,
                target_profile,
            } => {
                let match_id = parse_id(&row.id);
                let matched_at = parse_ts(&row.matched_at);

                if created {
                    info!("Match {} formed between {} and {}", match_id, actor, target);
                    self.sink.send(
                        actor,
                        GatewayEvent::MatchCreated {
                            match_id,
                            counterpart: target_profile.clone(),
                            matched_at,
                        },
                    );
                    self.sink.send(
                        target,
                        GatewayEvent::MatchCreated {
                            match_id,
                            counterpart: actor_profile,
                            matched_at,
                        },
                    );
                }

                Ok(LikeOutcome {
                    matched: true,
                    match_summary: Some(MatchSummary {
                        match_id,
                        counterpart: target_profile,
                        matched_at,
                        last_message: last_message_of(&row),
                    }),
                })
            }
        }
    }

    /// Record a dislike. Never forms a match, never emits an event.
    pub async fn dislike(&self, actor: Uuid, target: Uuid) -> Result<(), EngineError> {
        if actor == target {
            return Err(EngineError::Forbidden("cannot dislike yourself"));
        }

        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let (actor, target) = (actor.to_string(), target.to_string());
            db.get_user_by_id(&actor)?.ok_or(EngineError::NotFound)?;
            db.get_user_by_id(&target)?.ok_or(EngineError::NotFound)?;
            db.record_dislike(&actor, &target)?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Storage(anyhow!("join error: {}", e)))?
    }

    /// Append a message to a match and push `MessageCreated` to the other
    /// participant only; the sender's client already has the message.
    pub async fn send_message(
        &self,
        match_id: Uuid,
        sender: Uuid,
        content: String,
    ) -> Result<MessageResponse, EngineError> {
        if content.is_empty() {
            return Err(EngineError::InvalidContent("message content is empty"));
        }
        if content.chars().count() > self.max_message_len {
            return Err(EngineError::InvalidContent(
                "message content exceeds maximum length",
            ));
        }

        let db = self.db.clone();
        let (row, other) = tokio::task::spawn_blocking(
            move || -> Result<(MessageRow, String), EngineError> {
                let (mid, sender) = (match_id.to_string(), sender.to_string());

                let m = db.get_match(&mid)?.ok_or(EngineError::NotFound)?;
                if !m.is_active {
                    return Err(EngineError::NotFound);
                }
                let other = m
                    .other_user(&sender)
                    .ok_or(EngineError::Forbidden("not a participant in this match"))?
                    .to_string();

                let sent_at = Utc::now().to_rfc3339();
                let row = db
                    .append_message(
                        &mid,
                        &Uuid::new_v4().to_string(),
                        &sender,
                        &content,
                        &sent_at,
                    )?
                    // Deactivated between the read and the append
                    .ok_or(EngineError::NotFound)?;

                Ok((row, other))
            },
        )
        .await
        .map_err(|e| EngineError::Storage(anyhow!("join error: {}", e)))??;

        let message = message_response(row);
        match other.parse::<Uuid>() {
            Ok(other) => self.sink.send(
                other,
                GatewayEvent::MessageCreated {
                    match_id,
                    message: message.clone(),
                },
            ),
            Err(e) => warn!("Corrupt participant id '{}' on match {}: {}", other, match_id, e),
        }

        Ok(message)
    }

    /// Active matches for a user, newest first, with counterpart profiles
    /// and the last-message cache.
    pub async fn matches_for(&self, user: Uuid) -> Result<Vec<MatchSummary>, EngineError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<MatchSummary>, EngineError> {
            let rows = db.list_matches_for(&user.to_string())?;
            Ok(rows
                .into_iter()
                .map(|(m, u)| MatchSummary {
                    match_id: parse_id(&m.id),
                    counterpart: public_profile(&u),
                    matched_at: parse_ts(&m.matched_at),
                    last_message: last_message_of(&m),
                })
                .collect())
        })
        .await
        .map_err(|e| EngineError::Storage(anyhow!("join error: {}", e)))?
    }

    /// Ordered message log for a match; the caller must be a participant.
    pub async fn messages_for(
        &self,
        match_id: Uuid,
        caller: Uuid,
    ) -> Result<Vec<MessageResponse>, EngineError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<MessageResponse>, EngineError> {
            let mid = match_id.to_string();
            let m = db.get_match(&mid)?.ok_or(EngineError::NotFound)?;
            if !m.involves(&caller.to_string()) {
                return Err(EngineError::Forbidden("not a participant in this match"));
            }
            let rows = db.list_messages(&mid)?;
            Ok(rows.into_iter().map(message_response).collect())
        })
        .await
        .map_err(|e| EngineError::Storage(anyhow!("join error: {}", e)))?
    }

    /// Soft-unmatch: deactivate the match and clear both users' match sets.
    /// The match row itself is never deleted.
    pub async fn unmatch(&self, match_id: Uuid, caller: Uuid) -> Result<(), EngineError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let mid = match_id.to_string();
            let m = db.get_match(&mid)?.ok_or(EngineError::NotFound)?;
            if !m.is_active {
                return Err(EngineError::NotFound);
            }
            if !m.involves(&caller.to_string()) {
                return Err(EngineError::Forbidden("not a participant in this match"));
            }
            db.deactivate_match(&mid)?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Storage(anyhow!("join error: {}", e)))?
    }
}

fn like_blocking(db: &Database, actor: Uuid, target: Uuid) -> Result<Formation, EngineError> {
    let (actor_s, target_s) = (actor.to_string(), target.to_string());

    let actor_row = db.get_user_by_id(&actor_s)?.ok_or(EngineError::NotFound)?;
    let target_row = db.get_user_by_id(&target_s)?.ok_or(EngineError::NotFound)?;

    db.record_like(&actor_s, &target_s)?;

    if !db.has_liked(&target_s, &actor_s)? {
        return Ok(Formation::NotMutual);
    }

    // Reciprocal like: run the formation transaction. The pair-key UNIQUE
    // constraint makes the loser of a simultaneous-mutual-like race read the
    // winner's row back instead of erroring.
    let id = Uuid::new_v4().to_string();
    let matched_at = Utc::now().to_rfc3339();
    let mut attempt = 0;
    let (row, created) = loop {
        match db.create_match(&id, &actor, &target, &matched_at) {
            Ok(outcome) => break outcome,
            Err(e) if ember_db::is_busy(&e) && attempt < FORMATION_RETRIES => {
                attempt += 1;
                warn!("Match formation busy, retry {} of {}", attempt, FORMATION_RETRIES);
                std::thread::sleep(Duration::from_millis(20 * attempt as u64));
            }
            Err(e) => return Err(e.into()),
        }
    };

    Ok(Formation::Formed {
        row,
        created,
        actor_profile: public_profile(&actor_row),
        target_profile: public_profile(&target_row),
    })
}

/// Map a stored user row to its public profile: no email, no credentials.
pub fn public_profile(row: &UserRow) -> PublicProfile {
    PublicProfile {
        id: parse_id(&row.id),
        display_name: row.display_name.clone(),
        age: row.age,
        gender: Gender::parse(&row.gender).unwrap_or_else(|| {
            warn!("Corrupt gender '{}' on user '{}'", row.gender, row.id);
            Gender::Other
        }),
        bio: row.bio.clone(),
        photos: serde_json::from_str(&row.photos).unwrap_or_else(|e| {
            warn!("Corrupt photos on user '{}': {}", row.id, e);
            Vec::new()
        }),
    }
}

fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: parse_id(&row.id),
        match_id: parse_id(&row.match_id),
        sender_id: parse_id(&row.sender_id),
        content: row.content,
        sent_at: parse_ts(&row.sent_at),
        is_read: row.is_read,
    }
}

fn last_message_of(row: &MatchRow) -> Option<LastMessage> {
    match (
        &row.last_message_content,
        &row.last_message_sender,
        &row.last_message_at,
    ) {
        (Some(content), Some(sender), Some(at)) => Some(LastMessage {
            content: content.clone(),
            sender_id: parse_id(sender),
            sent_at: parse_ts(at),
        }),
        _ => None,
    }
}

fn parse_id(s: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}': {}", s, e);
        Uuid::default()
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", s, e);
            DateTime::default()
        })
}
