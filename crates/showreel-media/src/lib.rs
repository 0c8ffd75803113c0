//! Media Upload Gateway: ships a local file to the cloud asset host and
//! reports the stable URL the host assigned.
//!
//! One blocking round trip per call, no internal retry; callers own retry
//! policy. The local file is not guaranteed to survive the call: on any
//! failure past the existence check it is deleted so failed uploads don't
//! accumulate on disk.

use std::path::Path;

use reqwest::{Client, StatusCode, multipart};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct MediaHostConfig {
    /// Account name, first path segment of every upload URL.
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Scheme + host of the upload API. Overridable so tests can point the
    /// gateway at a loopback stub.
    pub upload_base: String,
}

impl Default for MediaHostConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            upload_base: "https://api.cloudinary.com".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("no local file to upload: {0}")]
    MissingSource(String),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport failure talking to the media host: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("media host rejected the upload ({status}): {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("media host returned an unreadable descriptor: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

/// Descriptor the host returns for a stored asset. `url` is the stable
/// address callers persist; `duration` is present when the host probed a
/// video or audio file.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    #[serde(rename = "secure_url")]
    pub url: String,
    pub public_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Clone)]
pub struct MediaUploader {
    config: MediaHostConfig,
    client: Client,
}

impl MediaUploader {
    pub fn new(config: MediaHostConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Upload a local file; resource kind is auto-detected by the host.
    ///
    /// An empty or absent path is rejected before any remote contact. Past
    /// that point every failure deletes the local file before returning.
    pub async fn upload(&self, local_path: &Path) -> Result<UploadReceipt, MediaError> {
        if local_path.as_os_str().is_empty() {
            return Err(MediaError::MissingSource("<empty path>".to_string()));
        }

        let size = match tokio::fs::metadata(local_path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::MissingSource(local_path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        match self.send(local_path, size).await {
            Ok(receipt) => {
                info!(
                    "Uploaded {} to media host: {}",
                    local_path.display(),
                    receipt.url
                );
                Ok(receipt)
            }
            Err(e) => {
                self.discard(local_path).await;
                Err(e)
            }
        }
    }

    async fn send(&self, local_path: &Path, size: u64) -> Result<UploadReceipt, MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );

        let file = tokio::fs::File::open(local_path).await?;
        let stream = FramedRead::new(file, BytesCodec::new());
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let part = multipart::Part::stream_with_length(reqwest::Body::wrap_stream(stream), size)
            .file_name(file_name);

        let form = multipart::Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature);

        let url = format!(
            "{}/v1_1/{}/auto/upload",
            self.config.upload_base, self.config.cloud_name
        );

        let resp = self.client.post(&url).multipart(form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MediaError::Rejected { status, body });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Remove a spooled file after a failed upload. Already-gone is fine;
    /// anything else is logged and swallowed so the upload error wins.
    async fn discard(&self, local_path: &Path) {
        match tokio::fs::remove_file(local_path).await {
            Ok(()) => info!("Deleted local file {} after failed upload", local_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Local file {} already gone", local_path.display());
            }
            Err(e) => warn!("Could not delete {}: {}", local_path.display(), e),
        }
    }
}

/// Signed-upload digest: parameters sorted by name, joined as `k=v` pairs
/// with `&`, API secret appended, sha256 hex over the whole string.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode as AxStatus, routing::post};
    use std::path::PathBuf;

    fn uploader_for(base: &str) -> MediaUploader {
        MediaUploader::new(MediaHostConfig {
            cloud_name: "testcloud".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
            upload_base: base.into(),
        })
    }

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("showreel-media-{}-{}", std::process::id(), name))
    }

    #[test]
    fn signature_is_deterministic_and_secret_bound() {
        let a = sign_params(&[("timestamp", "1700000000")], "secret");
        let b = sign_params(&[("timestamp", "1700000000")], "secret");
        let c = sign_params(&[("timestamp", "1700000000")], "other");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_sorts_parameters() {
        let a = sign_params(&[("timestamp", "1"), ("eager", "x")], "s");
        let b = sign_params(&[("eager", "x"), ("timestamp", "1")], "s");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn empty_path_is_rejected_without_remote_contact() {
        // Nothing listens on this base; reaching it would fail loudly anyway.
        let uploader = uploader_for("http://127.0.0.1:9");

        let err = uploader.upload(Path::new("")).await.unwrap_err();
        assert!(matches!(err, MediaError::MissingSource(_)));
    }

    #[tokio::test]
    async fn absent_file_is_rejected_without_remote_contact() {
        let uploader = uploader_for("http://127.0.0.1:9");

        let err = uploader
            .upload(Path::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::MissingSource(_)));
    }

    #[tokio::test]
    async fn rejected_upload_deletes_the_local_file() {
        let router = Router::new().route(
            "/v1_1/testcloud/auto/upload",
            post(|| async { AxStatus::INTERNAL_SERVER_ERROR }),
        );
        let base = spawn_stub(router).await;

        let path = scratch_file("rejected.bin");
        tokio::fs::write(&path, b"some media bytes").await.unwrap();

        let err = uploader_for(&base).upload(&path).await.unwrap_err();
        assert!(matches!(err, MediaError::Rejected { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn successful_upload_returns_the_host_descriptor() {
        let router = Router::new().route(
            "/v1_1/testcloud/auto/upload",
            post(|| async {
                Json(serde_json::json!({
                    "secure_url": "https://cdn.example/testcloud/clip.mp4",
                    "url": "http://cdn.example/testcloud/clip.mp4",
                    "public_id": "clip",
                    "resource_type": "video",
                    "format": "mp4",
                    "bytes": 16,
                    "duration": 12.5,
                }))
            }),
        );
        let base = spawn_stub(router).await;

        let path = scratch_file("accepted.bin");
        tokio::fs::write(&path, b"some media bytes").await.unwrap();

        let receipt = uploader_for(&base).upload(&path).await.unwrap();
        assert_eq!(receipt.url, "https://cdn.example/testcloud/clip.mp4");
        assert_eq!(receipt.public_id, "clip");
        assert_eq!(receipt.resource_type, "video");
        assert_eq!(receipt.duration, Some(12.5));

        // Success leaves the spool file to the caller.
        assert!(path.exists());
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn unreadable_descriptor_counts_as_failure_and_cleans_up() {
        let router = Router::new().route(
            "/v1_1/testcloud/auto/upload",
            post(|| async { "not json" }),
        );
        let base = spawn_stub(router).await;

        let path = scratch_file("garbled.bin");
        tokio::fs::write(&path, b"some media bytes").await.unwrap();

        let err = uploader_for(&base).upload(&path).await.unwrap_err();
        assert!(matches!(err, MediaError::MalformedResponse(_)));
        assert!(!path.exists());
    }
}
