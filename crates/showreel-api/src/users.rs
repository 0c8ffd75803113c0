use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use showreel_auth::AccessClaims;
use showreel_db::models::{UserRow, VideoRow};
use showreel_types::api::{ChangePasswordRequest, UpdateAccountRequest, WatchHistoryResponse};
use showreel_types::models::User;

use crate::state::AppState;
use crate::videos::video_to_api;
use crate::{parse_timestamp, parse_uuid, spool};

/// 10 MB limit for avatar images.
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let user_id = claims.sub.to_string();
    let user = tokio::task::spawn_blocking(move || db.db.get_user_by_id(&user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(user_to_api(user)))
}

/// Update full name and/or email. This path never touches the password
/// column. Password mutation has its own route, which is what keeps a
/// stored hash from ever being re-hashed.
pub async fn update_account(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let full_name = req.full_name.map(|s| s.trim().to_string());
    let email = req.email.map(|s| s.trim().to_lowercase());

    if full_name.as_deref() == Some("") {
        return Err(StatusCode::BAD_REQUEST);
    }
    if let Some(e) = email.as_deref() {
        if !e.contains('@') {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let db = state.clone();
    let user_id = claims.sub.to_string();
    let updated = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<UserRow>> {
        let Some(row) = db.db.get_user_by_id(&user_id)? else {
            return Ok(None);
        };
        let full_name = full_name.unwrap_or(row.full_name);
        let email = email.unwrap_or(row.email);
        db.db.update_account(&user_id, &full_name, &email)?;
        db.db.get_user_by_id(&user_id)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        if showreel_db::is_unique_violation(&e) {
            StatusCode::CONFLICT
        } else {
            error!("Account update failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(user_to_api(updated)))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.new_password.len() < 6 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.clone();
    let user_id = claims.sub.to_string();
    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<bool>> {
        let Some(row) = db.db.get_user_by_id(&user_id)? else {
            return Ok(None);
        };
        if !showreel_auth::verify_password(&req.current_password, &row.password_hash)? {
            return Ok(Some(false));
        }
        // The one place an existing identity's password is re-hashed.
        let hash = showreel_auth::hash_password(&req.new_password)?;
        db.db.update_password(&user_id, &hash)?;
        Ok(Some(true))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("Password change failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match outcome {
        None => Err(StatusCode::NOT_FOUND),
        Some(false) => Err(StatusCode::UNAUTHORIZED),
        Some(true) => Ok(StatusCode::NO_CONTENT),
    }
}

/// PATCH /users/me/avatar: multipart `avatar` field, shipped through the
/// media gateway; the stored URL is replaced on success.
pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StatusCode> {
    let mut spooled = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        if field.name() == Some("avatar") {
            let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            if bytes.is_empty() {
                return Err(StatusCode::BAD_REQUEST);
            }
            if bytes.len() > MAX_IMAGE_BYTES {
                return Err(StatusCode::PAYLOAD_TOO_LARGE);
            }
            spooled = Some(spool::spool(&state.upload_dir, "avatar", &bytes).await?);
        }
    }
    let path = spooled.ok_or(StatusCode::BAD_REQUEST)?;

    let receipt = state.media.upload(&path).await.map_err(|e| {
        error!("Avatar upload failed: {}", e);
        StatusCode::BAD_GATEWAY
    })?;
    tokio::fs::remove_file(&path).await.ok();

    let db = state.clone();
    let user_id = claims.sub.to_string();
    let url = receipt.url;
    let updated = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<UserRow>> {
        db.db.update_avatar(&user_id, &url)?;
        db.db.get_user_by_id(&user_id)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(user_to_api(updated)))
}

/// GET /users/me/history: watch-history ids resolved to videos by lookup;
/// ids whose video is gone are skipped, never an error.
pub async fn watch_history(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let user_id = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<VideoRow>> {
        let ids = db.db.get_watch_history(&user_id)?;
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = db.db.get_video(&id)? {
                rows.push(row);
            }
        }
        Ok(rows)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(WatchHistoryResponse {
        videos: rows.into_iter().map(video_to_api).collect(),
    }))
}

pub async fn record_watch(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(video_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let user_id = claims.sub.to_string();
    let recorded = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
        if db.db.get_video(&video_id.to_string())?.is_none() {
            return Ok(false);
        }
        db.db.record_watch(&user_id, &video_id.to_string())?;
        Ok(true)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !recorded {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn user_to_api(row: UserRow) -> User {
    User {
        id: parse_uuid(&row.id, "user"),
        created_at: parse_timestamp(&row.created_at, "user"),
        username: row.username,
        email: row.email,
        full_name: row.full_name,
        avatar_url: row.avatar_url,
        cover_image_url: row.cover_image_url,
    }
}
