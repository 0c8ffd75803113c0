/// Credential and session-token primitives.
///
/// Two independent concerns live here, both pure (no I/O, no persistence):
/// - `password`: salted one-way hashing and verification (Argon2id).
/// - `token`: dual-secret signed token issuance (short-lived access,
///   longer-lived refresh) and the matching verification paths.
///
/// Persisting the refresh token and deciding when to re-hash a password
/// belong to the write paths that call into this crate.
pub mod password;
pub mod token;

pub use password::{AuthError, hash_password, verify_password};
pub use token::{
    AccessClaims, RefreshClaims, TokenError, TokenIdentity, TokenKeys, issue_access_token,
    issue_refresh_token, verify_access_token, verify_refresh_token,
};
