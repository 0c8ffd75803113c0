use std::path::PathBuf;
use std::sync::Arc;

use showreel_auth::TokenKeys;
use showreel_db::Database;
use showreel_media::MediaUploader;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub keys: TokenKeys,
    pub media: MediaUploader,
    /// Scratch directory where multipart uploads are spooled before the
    /// gateway ships them to the media host.
    pub upload_dir: PathBuf,
}
