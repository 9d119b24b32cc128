//! On-disk storage of act photos.

use crate::error::PhotoError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use wserver_protocol::RecordId;

/// Decode a photo sent as base64 text.
///
/// Terminals send the repr of a byte string (`b'...'`, with `\n` escapes
/// between base64 lines), so both the wrapper and line breaks are stripped.
pub fn decode_photo(encoded: &str) -> Result<Vec<u8>, PhotoError> {
    let trimmed = encoded.trim();
    let inner = ["b'", "b\""]
        .iter()
        .find_map(|prefix| {
            trimmed
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(&prefix[1..]))
        })
        .unwrap_or(trimmed);

    let cleaned: String = inner
        .replace("\\n", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Err(PhotoError::Empty);
    }

    Ok(STANDARD.decode(cleaned)?)
}

/// Directory act photos are written to.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fresh file name for a photo of `record`: `<record>___<uuid4>.png`.
    pub fn photo_path(&self, record: RecordId) -> PathBuf {
        self.dir.join(format!("{}___{}.png", record, Uuid::new_v4()))
    }

    /// Decode and write one photo, returning where it was stored.
    pub async fn save(&self, record: RecordId, encoded: &str) -> Result<PathBuf, PhotoError> {
        let bytes = decode_photo(encoded)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.photo_path(record);
        tokio::fs::write(&path, &bytes).await?;
        debug!(%record, path = %path.display(), size = bytes.len(), "Photo stored");
        Ok(path)
    }

    /// Remove a stored photo whose row was never written.
    pub async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove orphaned photo");
        }
    }
}
