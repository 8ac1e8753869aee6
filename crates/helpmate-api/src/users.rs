use axum::{
    Extension, Json,
    extract::State,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use helpmate_db::models::{UserRow, format_timestamp};
use helpmate_types::api::{Claims, UpsertProfileRequest};
use helpmate_types::models::UserProfile;

use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppPath};
use crate::{AppState, convert, with_db};

/// `PUT /users/me`: publish or replace the requester's profile.
pub async fn upsert_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<UpsertProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let username = req.username.trim().to_string();
    let length = username.chars().count();
    if !(3..=32).contains(&length) {
        return Err(ApiError::Validation(
            "Username must be between 3 and 32 characters".into(),
        ));
    }

    let id = claims.sub.to_string();
    let row = with_db(&state, move |db| {
        if let Some(taken) = db.get_user_by_username(&username)? {
            if taken.id != id {
                return Err(ApiError::Conflict("Username already taken".into()));
            }
        }

        let created_at = db
            .get_user_by_id(&id)?
            .map_or_else(|| format_timestamp(Utc::now()), |existing| existing.created_at);

        let row = UserRow {
            id,
            username,
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            profile_picture: req.profile_picture,
            created_at,
        };
        db.upsert_user(&row)?;
        Ok(row)
    })
    .await?;

    info!("{} ({}) updated their profile", row.username, claims.sub);
    Ok(Json(convert::profile(row)))
}

/// `GET /users/{id}`: public profile.
pub async fn get_profile(
    State(state): State<AppState>,
    AppPath(user_id): AppPath<Uuid>,
) -> ApiResult<Json<UserProfile>> {
    let row = with_db(&state, move |db| {
        db.get_user_by_id(&user_id.to_string())?
            .ok_or(ApiError::NotFound("User"))
    })
    .await?;

    Ok(Json(convert::profile(row)))
}
