use serde::{Deserialize, Serialize};

use crate::models::{User, Video};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

// -- Account maintenance --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAccountRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// -- Videos --

#[derive(Debug, Serialize)]
pub struct VideoResponse {
    pub video: Video,
}

#[derive(Debug, Serialize)]
pub struct ViewCountResponse {
    pub id: uuid::Uuid,
    pub views: u64,
}

#[derive(Debug, Serialize)]
pub struct PublishStateResponse {
    pub id: uuid::Uuid,
    pub is_published: bool,
}

// -- Watch history --

#[derive(Debug, Serialize)]
pub struct WatchHistoryResponse {
    pub videos: Vec<Video>,
}
