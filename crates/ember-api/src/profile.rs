use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::warn;
use uuid::Uuid;

use ember_match::engine::public_profile;
use ember_types::api::{Claims, PreferencesResponse, UpdatePreferencesRequest};
use ember_types::models::{Gender, PublicProfile};

use crate::auth::AppState;
use crate::error::ApiError;

const DISCOVER_LIMIT: u32 = 20;

/// Candidate profiles for the caller: inside their age window, matching
/// their interested-in set, excluding everyone already liked, disliked, or
/// matched. Ranking quality is not this endpoint's business; newest first.
pub async fn discover(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<PublicProfile>>, ApiError> {
    let me = state
        .db
        .get_user_by_id(&claims.sub.to_string())?
        .ok_or(ApiError::NotFound("user not found"))?;

    let interested_in = parse_interests(&me.id, &me.interested_in);

    let candidates = state
        .db
        .discover_candidates(&me.id, me.age_min, me.age_max, DISCOVER_LIMIT)?;

    let profiles = candidates
        .iter()
        .filter(|candidate| {
            interested_in.is_empty()
                || Gender::parse(&candidate.gender)
                    .is_some_and(|g| interested_in.contains(&g))
        })
        .map(public_profile)
        .collect();

    Ok(Json(profiles))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<PublicProfile>, ApiError> {
    let user = state
        .db
        .get_user_by_id(&user_id.to_string())?
        .ok_or(ApiError::NotFound("user not found"))?;

    Ok(Json(public_profile(&user)))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePreferencesRequest>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let me = state
        .db
        .get_user_by_id(&claims.sub.to_string())?
        .ok_or(ApiError::NotFound("user not found"))?;

    let age_min = req.age_min.unwrap_or(me.age_min);
    let age_max = req.age_max.unwrap_or(me.age_max);
    if age_min < 18 || age_max > 100 || age_min > age_max {
        return Err(ApiError::BadRequest("invalid age range"));
    }

    let interested_in = req
        .interested_in
        .unwrap_or_else(|| parse_interests(&me.id, &me.interested_in));
    let interested_json =
        serde_json::to_string(&interested_in).map_err(|e| ApiError::Internal(e.into()))?;

    state
        .db
        .update_preferences(&me.id, age_min, age_max, &interested_json)?;

    Ok(Json(PreferencesResponse {
        age_min,
        age_max,
        interested_in,
    }))
}

fn parse_interests(user_id: &str, raw: &str) -> Vec<Gender> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Corrupt interested_in on user '{}': {}", user_id, e);
        Vec::new()
    })
}
