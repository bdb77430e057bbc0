//! Media kinds and the asset metadata returned to the persistence layer.

use serde::{Deserialize, Serialize};

/// Media categories served by this service. Each kind maps to its own
/// subdirectory under the media root and its own URL path segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Images,
    Pdfs,
    Videos,
}

impl MediaKind {
    /// Directory name (and URL segment) for this kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            MediaKind::Images => "images",
            MediaKind::Pdfs => "pdfs",
            MediaKind::Videos => "videos",
        }
    }

    /// Parse a URL path segment. Unknown kinds are treated as not-found by
    /// callers rather than bad-request, so the route space stays opaque.
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "images" => Some(MediaKind::Images),
            "pdfs" => Some(MediaKind::Pdfs),
            "videos" => Some(MediaKind::Videos),
            _ => None,
        }
    }
}

/// Metadata for one stored media file, as handed to the course-persistence
/// collaborator in the upload response. The URL is derived from the request
/// host and never stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaAsset {
    pub label: String,
    pub filename: String,
    pub url: String,
    /// Whether the encoder failed and the original bytes were delivered
    /// unchanged. Videos only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
    /// Whether the client may download the file. PDFs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloadable: Option<bool>,
    /// Slash-joined folder path within the section. PDFs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// A video that reached the transcode stage but could not be delivered,
/// because both the encode and the fallback rename failed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DroppedAsset {
    /// Position in the submitted `videos` field list.
    pub index: usize,
    pub label: String,
    pub reason: String,
}

/// Result of one section upload. Asset order matches submission order;
/// a non-empty `dropped` list is a partial success, not a request failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SectionMediaResponse {
    pub videos: Vec<MediaAsset>,
    pub pdfs: Vec<MediaAsset>,
    pub dropped: Vec<DroppedAsset>,
}
