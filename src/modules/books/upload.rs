//! Cover image uploads.
//!
//! The multipart `coverImage` part is written to
//! `{dir}/{unix_millis}-{nonce}-{file name}`. The file only survives if the
//! caller calls [`StoredCover::keep`]; every other exit path deletes it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::extract::multipart::{Field, Multipart};
use bookshelf_http::AppError;
use bookshelf_kernel::settings::UploadSettings;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Multipart field carrying the cover image.
pub const COVER_FIELD: &str = "coverImage";

const FALLBACK_NAME: &str = "cover";

/// Where uploaded covers go and how large they may be.
#[derive(Debug, Clone)]
pub struct CoverStorage {
    dir: PathBuf,
    max_bytes: usize,
}

impl CoverStorage {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn from_settings(settings: &UploadSettings) -> Self {
        Self::new(settings.dir.clone(), settings.max_bytes)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Create the upload directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create upload directory {}", self.dir.display()))
    }

    /// Store the first `coverImage` part of `multipart`.
    ///
    /// Returns `Ok(None)` when the request carries no such part.
    pub async fn receive(&self, mut multipart: Multipart) -> Result<Option<StoredCover>, AppError> {
        while let Some(field) = multipart.next_field().await? {
            if field.name() != Some(COVER_FIELD) {
                continue;
            }

            let file_name = cover_file_name(
                field.file_name(),
                chrono::Utc::now().timestamp_millis(),
                &upload_nonce(),
            );
            let path = self.dir.join(file_name);

            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
                .map_err(AppError::internal)?;

            // From here on the guard owns the file on disk.
            let stored = StoredCover::new(path);
            write_field(field, file, self.max_bytes).await?;

            tracing::debug!(path = %stored.path().display(), "cover image received");
            return Ok(Some(stored));
        }

        Ok(None)
    }

    /// Remove a previously kept cover once no book refers to it.
    ///
    /// Only files directly inside the upload directory are touched;
    /// client-supplied `coverImage` values pointing elsewhere are left alone.
    pub async fn discard(&self, recorded: &str) {
        let path = Path::new(recorded);
        if path.parent() != Some(self.dir.as_path()) || path.file_name().is_none() {
            tracing::debug!(path = recorded, "cover outside upload directory left in place");
            return;
        }

        match fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = recorded, "removed replaced cover image"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = recorded,
                error = %err,
                "failed to remove replaced cover image"
            ),
        }
    }
}

/// Short random token keeping same-millisecond uploads apart.
fn upload_nonce() -> String {
    let mut nonce = uuid::Uuid::new_v4().simple().to_string();
    nonce.truncate(12);
    nonce
}

/// Copy a multipart field into `file`, enforcing `max_bytes`.
///
/// `file` is closed when this returns, before any cleanup runs.
async fn write_field(mut field: Field<'_>, mut file: File, max_bytes: usize) -> Result<(), AppError> {
    let mut written = 0usize;

    while let Some(chunk) = field.chunk().await? {
        written += chunk.len();
        if written > max_bytes {
            return Err(AppError::PayloadTooLarge {
                message: format!("Cover image exceeds the {} byte limit", max_bytes),
            });
        }
        file.write_all(&chunk).await.map_err(AppError::internal)?;
    }

    file.flush().await.map_err(AppError::internal)?;
    Ok(())
}

/// `{millis}-{nonce}-{name}` with the client-supplied name reduced to a
/// safe single path component.
pub fn cover_file_name(original: Option<&str>, millis: i64, nonce: &str) -> String {
    let base = original
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .unwrap_or_default();

    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');

    let name = if sanitized.is_empty() {
        FALLBACK_NAME
    } else {
        sanitized
    };
    format!("{}-{}-{}", millis, nonce, name)
}

/// An uploaded file that is removed on drop unless kept.
#[derive(Debug)]
pub struct StoredCover {
    path: PathBuf,
    keep: bool,
}

impl StoredCover {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as recorded on the book.
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Keep the file and return its recorded path.
    pub fn keep(mut self) -> String {
        self.keep = true;
        self.path_string()
    }
}

impl Drop for StoredCover {
    fn drop(&mut self) {
        if self.keep {
            return;
        }

        // Synchronous so the file is gone before the error response is sent.

        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "discarded cover image"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to discard cover image"
            ),
        }
    }
}
