//! src/services/media_store.rs
//!
//! MediaStore — directory-per-kind file storage under `root/{images,pdfs,videos}`.
//! The store is the sole owner of final on-disk files; it generates
//! collision-resistant filenames, derives public URLs, and performs
//! idempotent deletion. It keeps no
//! metadata of its own — stored filenames are handed back to the caller.

use crate::models::asset::MediaKind;
use chrono::Utc;
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Temp-name prefix marking a video that still awaits transcoding.
pub const STAGED_VIDEO_PREFIX: &str = "temp-video-";
/// Final-name prefix for transcoded (or fallen-back) videos.
pub const FINAL_VIDEO_PREFIX: &str = "video-";
/// Final-name prefix for PDFs, which skip the transcode stage.
pub const PDF_PREFIX: &str = "pdf-";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media file `{0}` not found")]
    NotFound(String),
    #[error("invalid media filename")]
    InvalidFilename,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// Directory-per-kind media store.
#[derive(Clone, Debug)]
pub struct MediaStore {
    /// Root directory holding one subdirectory per [`MediaKind`].
    pub root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the per-kind directories if absent.
    pub async fn ensure_dirs(&self) -> MediaResult<()> {
        for kind in [MediaKind::Images, MediaKind::Pdfs, MediaKind::Videos] {
            fs::create_dir_all(self.dir(kind)).await?;
        }
        Ok(())
    }

    /// Directory holding files of the given kind.
    pub fn dir(&self, kind: MediaKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Reject filenames that could escape the kind directory.
    fn ensure_filename_safe(filename: &str) -> MediaResult<()> {
        if filename.is_empty() || filename.contains("..") {
            return Err(MediaError::InvalidFilename);
        }
        if filename
            .bytes()
            .any(|b| b == b'/' || b == b'\\' || b.is_ascii_control())
        {
            return Err(MediaError::InvalidFilename);
        }
        Ok(())
    }

    /// Full path of a stored file. Validates the filename first.
    pub fn path_for(&self, kind: MediaKind, filename: &str) -> MediaResult<PathBuf> {
        Self::ensure_filename_safe(filename)?;
        Ok(self.dir(kind).join(filename))
    }

    /// Generate a collision-resistant filename: prefix, millisecond
    /// timestamp, random suffix, and the original file's extension.
    /// Unique names let concurrent writers share a directory without locks.
    pub fn unique_name(prefix: &str, original_name: &str) -> String {
        let ext = std::path::Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        format!(
            "{}{}-{}{}",
            prefix,
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            ext
        )
    }

    /// Final filename for a staged video: `temp-video-X` becomes `video-X`.
    pub fn final_video_name(staged_filename: &str) -> String {
        match staged_filename.strip_prefix(STAGED_VIDEO_PREFIX) {
            Some(rest) => format!("{FINAL_VIDEO_PREFIX}{rest}"),
            None => staged_filename.to_string(),
        }
    }

    /// Public URL of a stored file. Pure function of host + kind + filename
    /// so clients can cache the result; performs no I/O.
    pub fn url_for(host: &str, kind: MediaKind, filename: &str) -> String {
        format!("http://{}/media/{}/{}", host, kind.dir_name(), filename)
    }

    /// Best-effort idempotent deletion: a missing file is not an error.
    /// Parent-entity deletion may repeat after a prior partial delete.
    pub async fn delete(&self, kind: MediaKind, filename: &str) -> MediaResult<()> {
        let path = self.path_for(kind, filename)?;
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed media file {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("media file {} already missing", path.display());
            }
            Err(err) => return Err(MediaError::Io(err)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unique_names_keep_extension_and_differ() {
        let a = MediaStore::unique_name(STAGED_VIDEO_PREFIX, "Lecture 1.MP4");
        let b = MediaStore::unique_name(STAGED_VIDEO_PREFIX, "Lecture 1.MP4");
        assert!(a.starts_with(STAGED_VIDEO_PREFIX));
        assert!(a.ends_with(".mp4"));
        assert_ne!(a, b);
    }

    #[test]
    fn final_video_name_swaps_prefix() {
        assert_eq!(
            MediaStore::final_video_name("temp-video-17-abc.mp4"),
            "video-17-abc.mp4"
        );
        assert_eq!(MediaStore::final_video_name("video-17.mp4"), "video-17.mp4");
    }

    #[test]
    fn url_for_is_stable() {
        let first = MediaStore::url_for("example.com:3000", MediaKind::Videos, "video-1.mp4");
        let second = MediaStore::url_for("example.com:3000", MediaKind::Videos, "video-1.mp4");
        assert_eq!(first, "http://example.com:3000/media/videos/video-1.mp4");
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_traversal_filenames() {
        let store = MediaStore::new("/tmp/media");
        for bad in ["../etc/passwd", "a/b.mp4", "", "a\\b", "a\0b"] {
            assert!(
                matches!(
                    store.path_for(MediaKind::Videos, bad),
                    Err(MediaError::InvalidFilename)
                ),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let path = store.path_for(MediaKind::Pdfs, "pdf-1.pdf").unwrap();
        tokio::fs::write(&path, b"pdf bytes").await.unwrap();

        store.delete(MediaKind::Pdfs, "pdf-1.pdf").await.unwrap();
        assert!(!path.exists());
        // Second delete of the same filename must not error.
        store.delete(MediaKind::Pdfs, "pdf-1.pdf").await.unwrap();
    }
}
