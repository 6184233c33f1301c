//! Cover image storage on the local filesystem.

use crate::error::Result;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Accepted cover image extensions (checked by filename suffix only).
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Check whether a filename carries an accepted image extension.
pub fn allowed_image(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}

/// Reduce a client-supplied filename to a safe flat ASCII name.
///
/// Accented letters are decomposed (NFKD) so `é` keeps its base `e`. Path
/// separators become spaces, whitespace runs become `_`, anything outside
/// `[A-Za-z0-9_.-]` is dropped and leading/trailing `.`/`_` are stripped.
/// May return an empty string.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename.nfkd().filter(char::is_ascii).collect();
    let flattened = ascii.replace(['/', '\\'], " ");
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Directory holding uploaded cover images.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Upload directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a stored image.
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Save an upload. Returns the stored filename, or `None` when the file was
    /// rejected. An existing file with the same name is overwritten.
    pub async fn save(&self, filename: &str, data: &[u8]) -> Result<Option<String>> {
        if !allowed_image(filename) {
            tracing::info!(filename, "Ignoring upload with unsupported extension");
            return Ok(None);
        }

        let name = secure_filename(filename);
        if name.is_empty() || !allowed_image(&name) {
            tracing::info!(filename, "Ignoring upload with unusable filename");
            return Ok(None);
        }

        let path = self.path_of(&name);
        tokio::fs::write(&path, data).await?;
        tracing::info!(path = %path.display(), bytes = data.len(), "Saved cover image");

        Ok(Some(name))
    }
}
