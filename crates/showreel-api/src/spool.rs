use std::path::{Path, PathBuf};

use axum::http::StatusCode;
use tracing::error;
use uuid::Uuid;

/// Write an uploaded field to a uniquely named scratch file under the
/// upload directory. The gateway consumes the file from there; failed
/// uploads are deleted by the gateway, successful ones by the handler.
pub(crate) async fn spool(dir: &Path, prefix: &str, bytes: &[u8]) -> Result<PathBuf, StatusCode> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        error!("Failed to create upload dir {}: {}", dir.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let path = dir.join(format!("{}-{}", prefix, Uuid::new_v4()));
    tokio::fs::write(&path, bytes).await.map_err(|e| {
        error!("Failed to spool upload {}: {}", path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(path)
}
