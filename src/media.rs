use std::path::{Path, PathBuf};

use crate::constants::{MEDIA_URL, RECIPE_IMAGE_DIR};
use crate::database::error::{field_error, Error, HtmlError};

/// Uploaded files on local disk, laid out under `root` the way they are
/// served under `/media/`.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    max_bytes: u64,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Stores `data` under a fresh name when it sniffs as an image and
    /// returns the path relative to `root`.
    pub async fn save_recipe_image(&self, data: &[u8]) -> Result<String, Error> {
        let kind = match infer::get(data) {
            Some(kind) if kind.matcher_type() == infer::MatcherType::Image => kind,
            _ => {
                return Err(field_error(
                    "image",
                    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
                ))
            }
        };

        let relative = format!(
            "{RECIPE_IMAGE_DIR}/{}.{}",
            uuid::Uuid::new_v4(),
            kind.extension()
        );
        let path = self.root.join(&relative);

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                log::error!("Failed to create {}: {e}", dir.display());
                HtmlError::InternalServerError.default()
            })?;
        }
        tokio::fs::write(&path, data).await.map_err(|e| {
            log::error!("Failed to write {}: {e}", path.display());
            HtmlError::InternalServerError.default()
        })?;

        log::debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(relative)
    }
}

/// Public URL of a stored file.
pub fn media_url(relative: &str) -> String {
    format!("{MEDIA_URL}{relative}")
}
