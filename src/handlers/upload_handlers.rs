//! Section media upload handler.
//!
//! One multipart request carries the `videos` and `pdfs` file fields plus
//! the positional metadata fields. The handler stages everything, runs the
//! video batch through the transcode runner, and answers only once every
//! job has reached a terminal state — the client-visible operation is
//! synchronous even though the work inside is parallel.

use crate::{
    errors::AppError,
    models::{
        asset::{DroppedAsset, MediaAsset, MediaKind, SectionMediaResponse},
        job::JobOutcome,
    },
    services::{media_store::MediaStore, upload},
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode, header},
};
use tracing::{info, warn};

/// `POST /media/sections`
///
/// Responds 201 with the asset list in submission order. Videos whose
/// encode failed are delivered as fallbacks (`"fallback": true`); a video
/// lost to a failed fallback rename appears under `dropped` instead —
/// partial success, never a request failure. A validation failure on any
/// part rejects the whole request with 400 after discarding everything
/// staged for it.
pub async fn upload_section_media(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SectionMediaResponse>), AppError> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_string();

    let form = upload::collect_section_upload(&state.store, multipart).await?;
    info!(
        videos = form.videos.len(),
        pdfs = form.pdfs.len(),
        "section upload staged, starting transcode batch"
    );

    let outcomes = state.runner.run_batch(&state.store, &form.videos).await;

    let mut response = SectionMediaResponse::default();
    for (index, (staged, outcome)) in form.videos.iter().zip(outcomes).enumerate() {
        let label = form
            .video_labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| staged.original_name.clone());
        match outcome {
            JobOutcome::Succeeded { filename } => response.videos.push(MediaAsset {
                label,
                url: MediaStore::url_for(&host, MediaKind::Videos, &filename),
                filename,
                fallback: Some(false),
                downloadable: None,
                folder: None,
            }),
            JobOutcome::FellBack { filename } => response.videos.push(MediaAsset {
                label,
                url: MediaStore::url_for(&host, MediaKind::Videos, &filename),
                filename,
                fallback: Some(true),
                downloadable: None,
                folder: None,
            }),
            JobOutcome::Dropped { reason } => {
                warn!(index, %label, %reason, "video dropped from section upload");
                response.dropped.push(DroppedAsset {
                    index,
                    label,
                    reason,
                });
            }
        }
    }

    for (index, staged) in form.pdfs.iter().enumerate() {
        let label = form
            .pdf_labels
            .get(index)
            .cloned()
            .or_else(|| {
                form.pdf_folders
                    .get(index)
                    .and_then(|entry| entry.label.clone())
            })
            .unwrap_or_else(|| staged.original_name.clone());
        response.pdfs.push(MediaAsset {
            label,
            url: MediaStore::url_for(&host, MediaKind::Pdfs, &staged.filename),
            filename: staged.filename.clone(),
            fallback: None,
            downloadable: Some(form.pdf_downloadable.get(index).copied().unwrap_or(false)),
            folder: folder_for(&form, index),
        });
    }

    info!(
        videos = response.videos.len(),
        pdfs = response.pdfs.len(),
        dropped = response.dropped.len(),
        "section media processed"
    );
    Ok((StatusCode::CREATED, Json(response)))
}

/// Folder assignment is positional, except that a single bare folder name
/// applies to every PDF of the request.
fn folder_for(form: &upload::SectionUploadForm, index: usize) -> Option<String> {
    if form.pdf_folders.len() == 1 && form.pdfs.len() > 1 {
        return form.pdf_folders[0].folder.clone();
    }
    form.pdf_folders
        .get(index)
        .and_then(|entry| entry.folder.clone())
}
