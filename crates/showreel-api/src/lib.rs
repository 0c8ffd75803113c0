pub mod auth;
pub mod middleware;
mod spool;
pub mod state;
pub mod users;
pub mod videos;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// Full HTTP surface. The binary and the integration tests build the same
/// router from the same state.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .with_state(state.clone());

    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::me).patch(users::update_account))
        .route("/users/me/password", post(users::change_password))
        .route("/users/me/avatar", patch(users::update_avatar))
        .route("/users/me/history", get(users::watch_history))
        .route("/users/me/history/{video_id}", post(users::record_watch))
        .route("/videos", post(videos::publish_video))
        .route("/videos/{video_id}", get(videos::get_video))
        .route("/videos/{video_id}/views", post(videos::increment_views))
        .route("/videos/{video_id}/publish", post(videos::toggle_publish))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().merge(public).merge(protected)
}

async fn health() -> &'static str {
    "ok"
}

pub(crate) fn parse_uuid(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}' on {}: {}", raw, context, e);
        Uuid::default()
    })
}

pub(crate) fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without
            // timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", raw, context, e);
            DateTime::default()
        })
}
