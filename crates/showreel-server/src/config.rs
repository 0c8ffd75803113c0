use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Duration;

use showreel_auth::TokenKeys;
use showreel_media::MediaHostConfig;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Everything the process reads from the environment, resolved once at
/// startup and handed to the components that need it. Nothing looks at
/// `std::env` after this returns.
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub keys: TokenKeys,
    pub media: MediaHostConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SHOWREEL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("SHOWREEL_PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .context("SHOWREEL_PORT is not a valid port")?;
        let db_path: PathBuf = std::env::var("SHOWREEL_DB_PATH")
            .unwrap_or_else(|_| "showreel.db".into())
            .into();
        let upload_dir: PathBuf = std::env::var("SHOWREEL_UPLOAD_DIR")
            .unwrap_or_else(|_| "./uploads".into())
            .into();

        let access_secret = required_secret("SHOWREEL_ACCESS_TOKEN_SECRET")?;
        let refresh_secret = required_secret("SHOWREEL_REFRESH_TOKEN_SECRET")?;
        if access_secret == refresh_secret {
            bail!("access and refresh signing secrets must differ");
        }

        let keys = TokenKeys {
            access_secret,
            refresh_secret,
            access_ttl: ttl_from_env("SHOWREEL_ACCESS_TOKEN_TTL_SECS", 900)?,
            refresh_ttl: ttl_from_env("SHOWREEL_REFRESH_TOKEN_TTL_SECS", 864_000)?,
        };

        let media = MediaHostConfig {
            cloud_name: required("SHOWREEL_MEDIA_CLOUD_NAME")?,
            api_key: required("SHOWREEL_MEDIA_API_KEY")?,
            api_secret: required("SHOWREEL_MEDIA_API_SECRET")?,
            upload_base: std::env::var("SHOWREEL_MEDIA_UPLOAD_BASE")
                .unwrap_or_else(|_| MediaHostConfig::default().upload_base),
        };

        Ok(Self {
            host,
            port,
            db_path,
            upload_dir,
            keys,
            media,
        })
    }
}

fn required(name: &str) -> Result<String> {
    let value = std::env::var(name).unwrap_or_default();
    if value.is_empty() {
        bail!("{name} is required");
    }
    Ok(value)
}

fn required_secret(name: &str) -> Result<String> {
    let value = required(name)?;
    if PLACEHOLDER_SECRETS.contains(&value.as_str()) {
        bail!("{name} is still a placeholder; set a real secret");
    }
    Ok(value)
}

fn ttl_from_env(name: &str, default_secs: i64) -> Result<Duration> {
    let secs: i64 = match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} is not a number of seconds"))?,
        Err(_) => default_secs,
    };
    if secs <= 0 {
        bail!("{name} must be positive");
    }
    Ok(Duration::seconds(secs))
}
