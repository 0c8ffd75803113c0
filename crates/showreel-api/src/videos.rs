use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use showreel_auth::AccessClaims;
use showreel_db::models::VideoRow;
use showreel_types::api::{PublishStateResponse, VideoResponse, ViewCountResponse};
use showreel_types::models::Video;

use crate::state::AppState;
use crate::{parse_timestamp, parse_uuid, spool};

/// 100 MB limit for video files, 10 MB for thumbnails.
const MAX_VIDEO_BYTES: usize = 100 * 1024 * 1024;
const MAX_THUMBNAIL_BYTES: usize = 10 * 1024 * 1024;

/// POST /videos: multipart `video` + `thumbnail` files plus `title` and
/// `description` fields. Both files go through the media gateway; the
/// catalog row is created only after both uploads succeed, so a failed
/// upload never leaves a partial entry.
pub async fn publish_video(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StatusCode> {
    let mut title = None;
    let mut description = None;
    let mut duration_field = None;
    let mut video_path = None;
    let mut thumbnail_path = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("video") => {
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                if bytes.is_empty() {
                    return Err(StatusCode::BAD_REQUEST);
                }
                if bytes.len() > MAX_VIDEO_BYTES {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE);
                }
                video_path = Some(spool::spool(&state.upload_dir, "video", &bytes).await?);
            }
            Some("thumbnail") => {
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                if bytes.is_empty() {
                    return Err(StatusCode::BAD_REQUEST);
                }
                if bytes.len() > MAX_THUMBNAIL_BYTES {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE);
                }
                thumbnail_path = Some(spool::spool(&state.upload_dir, "thumb", &bytes).await?);
            }
            Some("title") => {
                title = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            Some("description") => {
                description = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            Some("duration") => {
                let raw = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                duration_field = Some(raw.parse::<f64>().map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            _ => {}
        }
    }

    let title = title
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let description = description
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let video_path = video_path.ok_or(StatusCode::BAD_REQUEST)?;
    let thumbnail_path = thumbnail_path.ok_or(StatusCode::BAD_REQUEST)?;

    // The gateway deletes its own spool file on failure; the sibling file
    // is this handler's to clean up.
    let video_receipt = match state.media.upload(&video_path).await {
        Ok(receipt) => receipt,
        Err(e) => {
            error!("Video upload failed: {}", e);
            tokio::fs::remove_file(&thumbnail_path).await.ok();
            return Err(StatusCode::BAD_GATEWAY);
        }
    };
    let thumbnail_receipt = match state.media.upload(&thumbnail_path).await {
        Ok(receipt) => receipt,
        Err(e) => {
            error!("Thumbnail upload failed: {}", e);
            tokio::fs::remove_file(&video_path).await.ok();
            return Err(StatusCode::BAD_GATEWAY);
        }
    };
    tokio::fs::remove_file(&video_path).await.ok();
    tokio::fs::remove_file(&thumbnail_path).await.ok();

    // Prefer the duration the host probed from the media itself.
    let duration_secs = video_receipt
        .duration
        .or(duration_field)
        .ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;

    let video_id = Uuid::new_v4();
    let db = state.clone();
    let owner_id = claims.sub.to_string();
    let row = tokio::task::spawn_blocking(move || -> anyhow::Result<VideoRow> {
        db.db.create_video(
            &video_id.to_string(),
            &video_receipt.url,
            &thumbnail_receipt.url,
            &title,
            &description,
            duration_secs,
            &owner_id,
        )?;
        db.db
            .get_video(&video_id.to_string())?
            .ok_or_else(|| anyhow::anyhow!("video row vanished after insert"))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("Video insert failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        StatusCode::CREATED,
        Json(VideoResponse {
            video: video_to_api(row),
        }),
    ))
}

pub async fn get_video(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(video_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let id = video_id.to_string();
    let row = tokio::task::spawn_blocking(move || db.db.get_video(&id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    // Unpublished videos exist only for their owner.
    if !row.is_published && row.owner_id != claims.sub.to_string() {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(VideoResponse {
        video: video_to_api(row),
    }))
}

pub async fn increment_views(
    State(state): State<AppState>,
    Extension(_claims): Extension<AccessClaims>,
    Path(video_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let id = video_id.to_string();
    let views = tokio::task::spawn_blocking(move || db.db.increment_views(&id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ViewCountResponse {
        id: video_id,
        views: views.max(0) as u64,
    }))
}

pub async fn toggle_publish(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    Path(video_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let id = video_id.to_string();
    let row = tokio::task::spawn_blocking(move || db.db.get_video(&id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if row.owner_id != claims.sub.to_string() {
        return Err(StatusCode::FORBIDDEN);
    }

    let db = state.clone();
    let id = video_id.to_string();
    let is_published = tokio::task::spawn_blocking(move || db.db.toggle_published(&id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(PublishStateResponse {
        id: video_id,
        is_published,
    }))
}

pub(crate) fn video_to_api(row: VideoRow) -> Video {
    Video {
        id: parse_uuid(&row.id, "video"),
        owner_id: parse_uuid(&row.owner_id, "video"),
        created_at: parse_timestamp(&row.created_at, "video"),
        views: row.views.max(0) as u64,
        media_url: row.media_url,
        thumbnail_url: row.thumbnail_url,
        title: row.title,
        description: row.description,
        duration_secs: row.duration_secs,
        is_published: row.is_published,
    }
}
