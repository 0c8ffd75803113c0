use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct TokenError(#[from] jsonwebtoken::errors::Error);

/// Claims carried by the short-lived access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub exp: usize,
}

/// Claims carried by the refresh token: the identity id plus a random
/// token id. The `jti` keeps two rotations within the same second from
/// producing byte-identical tokens, which would defeat rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub exp: usize,
}

/// The identity subset that gets encoded into an access token.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
}

/// Signing secrets and lifetimes for both token kinds. Built once at
/// startup from configuration and passed to the handlers that mint or
/// check tokens; a missing secret is a boot failure, not a request error.
#[derive(Clone)]
pub struct TokenKeys {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

pub fn issue_access_token(
    identity: &TokenIdentity,
    secret: &str,
    ttl: Duration,
) -> Result<String, TokenError> {
    let claims = AccessClaims {
        sub: identity.id,
        email: identity.email.clone(),
        username: identity.username.clone(),
        full_name: identity.full_name.clone(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn issue_refresh_token(
    user_id: Uuid,
    secret: &str,
    ttl: Duration,
) -> Result<String, TokenError> {
    let claims = RefreshClaims {
        sub: user_id,
        jti: Uuid::new_v4(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn verify_access_token(token: &str, secret: &str) -> Result<AccessClaims, TokenError> {
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

pub fn verify_refresh_token(token: &str, secret: &str) -> Result<RefreshClaims, TokenError> {
    let data = decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> TokenIdentity {
        TokenIdentity {
            id: Uuid::new_v4(),
            email: "alice@x.com".into(),
            username: "alice".into(),
            full_name: "Alice Example".into(),
        }
    }

    #[test]
    fn access_token_roundtrip() {
        let ident = identity();
        let token = issue_access_token(&ident, "access-secret", Duration::minutes(15)).unwrap();

        let claims = verify_access_token(&token, "access-secret").unwrap();
        assert_eq!(claims.sub, ident.id);
        assert_eq!(claims.email, ident.email);
        assert_eq!(claims.username, ident.username);
        assert_eq!(claims.full_name, ident.full_name);
    }

    #[test]
    fn refresh_token_roundtrip() {
        let id = Uuid::new_v4();
        let token = issue_refresh_token(id, "refresh-secret", Duration::days(10)).unwrap();

        let claims = verify_refresh_token(&token, "refresh-secret").unwrap();
        assert_eq!(claims.sub, id);
    }

    #[test]
    fn refresh_tokens_are_never_identical() {
        let id = Uuid::new_v4();
        let a = issue_refresh_token(id, "refresh-secret", Duration::days(10)).unwrap();
        let b = issue_refresh_token(id, "refresh-secret", Duration::days(10)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_access_token(&identity(), "access-secret", Duration::minutes(15)).unwrap();
        assert!(verify_access_token(&token, "other-secret").is_err());
    }

    #[test]
    fn secrets_are_not_interchangeable() {
        let ident = identity();
        let access = issue_access_token(&ident, "access-secret", Duration::minutes(15)).unwrap();
        let refresh = issue_refresh_token(ident.id, "refresh-secret", Duration::days(10)).unwrap();

        // An access token never validates as a refresh token, and vice versa.
        assert!(verify_refresh_token(&access, "refresh-secret").is_err());
        assert!(verify_access_token(&refresh, "access-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        // Well past the default validation leeway.
        let token = issue_access_token(&identity(), "access-secret", Duration::hours(-1)).unwrap();
        assert!(verify_access_token(&token, "access-secret").is_err());
    }
}
