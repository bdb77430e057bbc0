//! Multipart intake: field routing, extension/MIME validation, and
//! streaming of file parts to disk.
//!
//! File parts are written chunk-by-chunk as they arrive — uploads are
//! unbounded in size (multi-gigabyte lecture recordings), so nothing here
//! may buffer a whole file in memory. Video parts are staged under a
//! `temp-video-` name awaiting transcode; PDF parts are written directly
//! under their final name.

use crate::{
    models::asset::MediaKind,
    services::{
        media_store::{MediaError, MediaResult, MediaStore, PDF_PREFIX, STAGED_VIDEO_PREFIX},
        pdf_folders::{self, FolderEntry},
    },
};
use axum::extract::multipart::{Field, Multipart, MultipartError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::{fs, fs::File, io::AsyncWriteExt};
use tracing::debug;

/// Extensions accepted on the `videos` field.
pub const VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v"];

/// Multipart file fields recognized by the section upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadField {
    Videos,
    Pdfs,
}

/// One file part staged to disk. Transient: consumed by the transcode
/// runner (videos) or turned into an asset directly (PDFs).
#[derive(Clone, Debug)]
pub struct StagedUpload {
    pub field: UploadField,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    /// Generated on-disk name: `temp-video-*` staging name for videos,
    /// final `pdf-*` name for PDFs.
    pub filename: String,
    pub path: PathBuf,
}

/// All parts of one section upload, staged and validated.
#[derive(Debug, Default)]
pub struct SectionUploadForm {
    pub videos: Vec<StagedUpload>,
    pub pdfs: Vec<StagedUpload>,
    pub video_labels: Vec<String>,
    pub pdf_labels: Vec<String>,
    pub pdf_downloadable: Vec<bool>,
    pub pdf_folders: Vec<FolderEntry>,
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Allow-list check for the `videos` field: known video extension, and a
/// declared MIME that is either `video/*` or names the same container.
pub fn video_part_allowed(filename: &str, mime: &str) -> bool {
    let Some(ext) = extension_of(filename) else {
        return false;
    };
    if !VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return false;
    }
    let mime = mime.to_ascii_lowercase();
    mime.starts_with("video/") || VIDEO_EXTENSIONS.iter().any(|token| mime.contains(token))
}

/// Allow-list check for the `pdfs` field.
pub fn pdf_part_allowed(filename: &str, mime: &str) -> bool {
    extension_of(filename).as_deref() == Some("pdf") && mime.eq_ignore_ascii_case("application/pdf")
}

fn multipart_err(err: MultipartError) -> MediaError {
    MediaError::Validation(format!("malformed multipart request: {err}"))
}

/// Parse a label list: a JSON array of strings, or the original client
/// convention of a comma-separated string.
fn parse_labels(raw: &str) -> Vec<String> {
    if let Ok(labels) = serde_json::from_str::<Vec<String>>(raw) {
        return labels;
    }
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse the `pdf_downloadable` list with the original's loose boolean
/// coercion: JSON booleans, the strings "true"/"false", or a
/// comma-separated string. Anything unrecognized coerces to false.
fn parse_bool_list(raw: &str) -> Vec<bool> {
    if let Ok(values) = serde_json::from_str::<Vec<Value>>(raw) {
        return values
            .iter()
            .map(|v| v.as_bool().unwrap_or(v.as_str() == Some("true")))
            .collect();
    }
    raw.split(',').map(|s| s.trim() == "true").collect()
}

/// Stream one file part to disk under a freshly generated name.
async fn stage_file_part(
    store: &MediaStore,
    mut field: Field<'_>,
    upload_field: UploadField,
) -> MediaResult<StagedUpload> {
    let original_name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().unwrap_or_default().to_string();

    let (kind, prefix) = match upload_field {
        UploadField::Videos => (MediaKind::Videos, STAGED_VIDEO_PREFIX),
        UploadField::Pdfs => (MediaKind::Pdfs, PDF_PREFIX),
    };

    let allowed = match upload_field {
        UploadField::Videos => video_part_allowed(&original_name, &content_type),
        UploadField::Pdfs => pdf_part_allowed(&original_name, &content_type),
    };
    if !allowed {
        return Err(MediaError::Validation(match upload_field {
            UploadField::Videos => format!("only video files are allowed for `videos` (got `{original_name}`, `{content_type}`)"),
            UploadField::Pdfs => format!("only PDF files are allowed for `pdfs` (got `{original_name}`, `{content_type}`)"),
        }));
    }

    let filename = MediaStore::unique_name(prefix, &original_name);
    let path = store.path_for(kind, &filename)?;
    let mut file = File::create(&path).await?;

    let mut size_bytes: u64 = 0;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                let _ = fs::remove_file(&path).await;
                return Err(multipart_err(err));
            }
        };
        size_bytes += chunk.len() as u64;
        if let Err(err) = file.write_all(&chunk).await {
            let _ = fs::remove_file(&path).await;
            return Err(MediaError::Io(err));
        }
    }
    if let Err(err) = file.flush().await {
        let _ = fs::remove_file(&path).await;
        return Err(MediaError::Io(err));
    }

    debug!(
        field = ?upload_field,
        original = %original_name,
        staged = %filename,
        size_bytes,
        "staged upload part"
    );

    Ok(StagedUpload {
        field: upload_field,
        original_name,
        content_type,
        size_bytes,
        filename,
        path,
    })
}

/// Remove everything staged so far. Best-effort: the request has already
/// failed, so deletion errors are only logged.
async fn discard_staged(form: &SectionUploadForm) {
    for staged in form.videos.iter().chain(form.pdfs.iter()) {
        if let Err(err) = fs::remove_file(&staged.path).await {
            debug!(
                path = %staged.path.display(),
                "could not discard staged file: {err}"
            );
        }
    }
}

/// Read the whole multipart request, staging file parts and collecting the
/// positional metadata fields. On any validation or I/O error the already
/// staged sibling files are deleted before the error propagates, so a
/// rejected request leaves nothing on disk.
pub async fn collect_section_upload(
    store: &MediaStore,
    mut multipart: Multipart,
) -> MediaResult<SectionUploadForm> {
    let mut form = SectionUploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                discard_staged(&form).await;
                return Err(multipart_err(err));
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        let is_file = field.file_name().is_some();

        let result = match (name.as_str(), is_file) {
            ("videos", true) => match stage_file_part(store, field, UploadField::Videos).await {
                Ok(staged) => {
                    form.videos.push(staged);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            ("pdfs", true) => match stage_file_part(store, field, UploadField::Pdfs).await {
                Ok(staged) => {
                    form.pdfs.push(staged);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            (_, true) => Err(MediaError::Validation(format!(
                "unexpected file field `{name}`"
            ))),
            ("video_labels", false) => match field.text().await {
                Ok(raw) => {
                    form.video_labels = parse_labels(&raw);
                    Ok(())
                }
                Err(err) => Err(multipart_err(err)),
            },
            ("pdf_labels", false) => match field.text().await {
                Ok(raw) => {
                    form.pdf_labels = parse_labels(&raw);
                    Ok(())
                }
                Err(err) => Err(multipart_err(err)),
            },
            ("pdf_downloadable", false) => match field.text().await {
                Ok(raw) => {
                    form.pdf_downloadable = parse_bool_list(&raw);
                    Ok(())
                }
                Err(err) => Err(multipart_err(err)),
            },
            ("pdf_folders", false) => match field.text().await {
                Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                    Ok(value) => match pdf_folders::flatten(&value) {
                        Ok(entries) => {
                            form.pdf_folders = entries;
                            Ok(())
                        }
                        Err(err) => Err(err),
                    },
                    // A bare folder name, applied to every PDF of the request.
                    Err(_) => {
                        let trimmed = raw.trim();
                        if !trimmed.is_empty() {
                            form.pdf_folders = vec![FolderEntry {
                                label: None,
                                folder: Some(trimmed.to_string()),
                            }];
                        }
                        Ok(())
                    }
                },
                Err(err) => Err(multipart_err(err)),
            },
            // Other text fields (section title etc.) belong to the course
            // CRUD collaborator and pass through untouched.
            (_, false) => Ok(()),
        };

        if let Err(err) = result {
            discard_staged(&form).await;
            return Err(err);
        }
    }

    Ok(form)
}
