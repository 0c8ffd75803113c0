use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;
use uuid::Uuid;

use showreel_auth::{
    AccessClaims, TokenIdentity, issue_access_token, issue_refresh_token, verify_refresh_token,
};
use showreel_db::models::UserRow;
use showreel_types::api::{
    LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, RegisterRequest,
    RegisterResponse,
};

use crate::state::AppState;
use crate::users::user_to_api;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Username and email are case-folded and trimmed before any check, so
    // uniqueness is insensitive to case and padding.
    let username = req.username.trim().to_lowercase();
    let email = req.email.trim().to_lowercase();
    let full_name = req.full_name.trim().to_string();

    if username.len() < 3 || username.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 6 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !email.contains('@') || full_name.is_empty() || req.avatar_url.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Check if username or email is taken before paying for the hash.
    let db = state.clone();
    let (check_username, check_email) = (username.clone(), email.clone());
    let taken = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
        Ok(db.db.get_user_by_username(&check_username)?.is_some()
            || db.db.get_user_by_email(&check_email)?.is_some())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if taken {
        return Err(StatusCode::CONFLICT);
    }

    let user_id = Uuid::new_v4();

    // Hash and insert off the async path. The raw password never reaches a
    // row: if hashing fails, nothing is persisted. The UNIQUE constraints
    // back the check above against a racing registration.
    let db = state.clone();
    let password = req.password;
    let avatar_url = req.avatar_url;
    let cover_image_url = req.cover_image_url;
    let row = tokio::task::spawn_blocking(move || -> anyhow::Result<UserRow> {
        let hash = showreel_auth::hash_password(&password)?;
        db.db.create_user(
            &user_id.to_string(),
            &username,
            &email,
            &full_name,
            &avatar_url,
            cover_image_url.as_deref(),
            &hash,
        )?;
        db.db
            .get_user_by_id(&user_id.to_string())?
            .ok_or_else(|| anyhow::anyhow!("user row vanished after insert"))
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
            error!("Registration failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user_to_api(row),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let username = req.username.trim().to_lowercase();

    let db = state.clone();
    let user = tokio::task::spawn_blocking(move || db.db.get_user_by_username(&username))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        // Unknown user folds into the same 401 as a bad password.
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Argon2 verification is CPU-bound; keep it off the async path.
    let password = req.password;
    let stored_hash = user.password_hash.clone();
    let matched =
        tokio::task::spawn_blocking(move || showreel_auth::verify_password(&password, &stored_hash))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(|e| {
                error!("Password verification failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

    if !matched {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let identity = token_identity(&user)?;
    let access_token =
        issue_access_token(&identity, &state.keys.access_secret, state.keys.access_ttl)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let refresh_token =
        issue_refresh_token(identity.id, &state.keys.refresh_secret, state.keys.refresh_ttl)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // Session record: the fresh refresh token replaces whatever was stored.
    let db = state.clone();
    let user_id = user.id.clone();
    let stored_token = refresh_token.clone();
    tokio::task::spawn_blocking(move || db.db.set_refresh_token(&user_id, &stored_token))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LoginResponse {
        user: user_to_api(user),
        access_token,
        refresh_token,
    }))
}

/// Mint a fresh token pair from a valid refresh token.
///
/// The presented token must verify against the refresh secret AND match the
/// stored session record; rotation then goes through a compare-and-swap so
/// that of two concurrent renewals exactly one wins.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let claims = verify_refresh_token(&req.refresh_token, &state.keys.refresh_secret)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let db = state.clone();
    let user_id = claims.sub.to_string();
    let user = tokio::task::spawn_blocking(move || db.db.get_user_by_id(&user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if user.refresh_token.as_deref() != Some(req.refresh_token.as_str()) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let identity = token_identity(&user)?;
    let access_token =
        issue_access_token(&identity, &state.keys.access_secret, state.keys.access_ttl)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let next_refresh =
        issue_refresh_token(identity.id, &state.keys.refresh_secret, state.keys.refresh_ttl)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let db = state.clone();
    let user_id = user.id.clone();
    let previous = req.refresh_token;
    let next = next_refresh.clone();
    let rotated =
        tokio::task::spawn_blocking(move || db.db.rotate_refresh_token(&user_id, &previous, &next))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !rotated {
        // Lost the race to a concurrent renewal; this token is dead.
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(Json(RefreshResponse {
        access_token,
        refresh_token: next_refresh,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let user_id = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.db.clear_refresh_token(&user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::NO_CONTENT)
}

fn token_identity(user: &UserRow) -> Result<TokenIdentity, StatusCode> {
    let id = user.id.parse().map_err(|_| {
        error!("Corrupt user id '{}' in users table", user.id);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(TokenIdentity {
        id,
        email: user.email.clone(),
        username: user.username.clone(),
        full_name: user.full_name.clone(),
    })
}
