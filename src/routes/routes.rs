//! Defines routes for the media pipeline.
//!
//! ## Structure
//! - **Upload endpoint**
//!   - `POST /media/sections` — multipart section upload (`videos`, `pdfs`
//!     file fields plus positional label/downloadable/folder fields)
//!
//! - **Delivery endpoints**
//!   - `GET    /media/{kind}/{filename}` — byte-range streaming (200/206/416)
//!   - `DELETE /media/{kind}/{filename}` — idempotent file deletion
//!
//! The default request body limit is disabled on the whole router:
//! multi-gigabyte lecture recordings are expected, and the upload path
//! streams to disk instead of buffering.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        media_handlers::{delete_media, get_media},
        upload_handlers::upload_section_media,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for all media routes.
///
/// The router carries shared state ([`AppState`]) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // upload
        .route("/media/sections", post(upload_section_media))
        // delivery
        .route("/media/{kind}/{filename}", get(get_media).delete(delete_media))
        .layer(DefaultBodyLimit::disable())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::asset::{MediaKind, SectionMediaResponse},
        services::{
            media_store::MediaStore,
            transcode::{TranscodeRunner, testing::ScriptedEncoder},
        },
        state::AppState,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
        response::Response,
    };
    use http_body_util::BodyExt;
    use std::{sync::Arc, time::Duration};
    use tempfile::{TempDir, tempdir};
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "X-COURSE-MEDIA-TEST";

    async fn test_app(dir: &TempDir) -> (Router, MediaStore) {
        let store = MediaStore::new(dir.path());
        store.ensure_dirs().await.unwrap();
        let runner = TranscodeRunner::new(
            Arc::new(ScriptedEncoder::new()),
            4,
            Duration::from_secs(2 * 60 * 60),
        );
        let app = routes().with_state(AppState {
            store: store.clone(),
            runner,
        });
        (app, store)
    }

    async fn body_of(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> &'a str {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    fn get_with_range(path: &str, range: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range);
        }
        builder.body(Body::empty()).unwrap()
    }

    /// Deterministic non-trivial file content for slice comparisons.
    fn sample_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn put_video(store: &MediaStore, filename: &str, data: &[u8]) {
        let path = store.path_for(MediaKind::Videos, filename).unwrap();
        tokio::fs::write(&path, data).await.unwrap();
    }

    // --- range streaming ---

    #[tokio::test]
    async fn full_get_streams_the_whole_file() {
        let dir = tempdir().unwrap();
        let (app, store) = test_app(&dir).await;
        let data = sample_bytes(1000);
        put_video(&store, "video-full.mp4", &data).await;

        let response = app
            .oneshot(get_with_range("/media/videos/video-full.mp4", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::ACCEPT_RANGES), "bytes");
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), "1000");
        assert_eq!(header_str(&response, header::CONTENT_TYPE), "video/mp4");
        assert_eq!(body_of(response).await, data);
    }

    #[tokio::test]
    async fn ranged_get_returns_the_exact_inclusive_slice() {
        let dir = tempdir().unwrap();
        let (app, store) = test_app(&dir).await;
        let data = sample_bytes(1000);
        put_video(&store, "video-slice.mp4", &data).await;

        let response = app
            .oneshot(get_with_range(
                "/media/videos/video-slice.mp4",
                Some("bytes=100-199"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            "bytes 100-199/1000"
        );
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), "100");
        assert_eq!(header_str(&response, header::ACCEPT_RANGES), "bytes");
        assert_eq!(body_of(response).await, &data[100..=199]);
    }

    #[tokio::test]
    async fn open_ended_range_runs_to_eof_and_overlong_end_is_clamped() {
        let dir = tempdir().unwrap();
        let (app, store) = test_app(&dir).await;
        let data = sample_bytes(1000);
        put_video(&store, "video-tail.mp4", &data).await;

        let response = app
            .clone()
            .oneshot(get_with_range(
                "/media/videos/video-tail.mp4",
                Some("bytes=950-"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            "bytes 950-999/1000"
        );
        assert_eq!(body_of(response).await, &data[950..]);

        let response = app
            .oneshot(get_with_range(
                "/media/videos/video-tail.mp4",
                Some("bytes=900-5000"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header_str(&response, header::CONTENT_RANGE),
            "bytes 900-999/1000"
        );
        assert_eq!(header_str(&response, header::CONTENT_LENGTH), "100");
    }

    #[tokio::test]
    async fn range_starting_at_eof_is_unsatisfiable() {
        let dir = tempdir().unwrap();
        let (app, store) = test_app(&dir).await;
        put_video(&store, "video-eof.mp4", &sample_bytes(1000)).await;

        let response = app
            .oneshot(get_with_range(
                "/media/videos/video-eof.mp4",
                Some("bytes=1000-1100"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(header_str(&response, header::CONTENT_RANGE), "bytes */1000");
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn full_and_whole_file_ranged_bodies_round_trip() {
        let dir = tempdir().unwrap();
        let (app, store) = test_app(&dir).await;
        put_video(&store, "video-rt.mp4", &sample_bytes(4096)).await;

        let full = app
            .clone()
            .oneshot(get_with_range("/media/videos/video-rt.mp4", None))
            .await
            .unwrap();
        let ranged = app
            .oneshot(get_with_range(
                "/media/videos/video-rt.mp4",
                Some("bytes=0-4095"),
            ))
            .await
            .unwrap();

        assert_eq!(full.status(), StatusCode::OK);
        assert_eq!(ranged.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(body_of(full).await, body_of(ranged).await);
    }

    #[tokio::test]
    async fn malformed_range_degrades_to_whole_file() {
        let dir = tempdir().unwrap();
        let (app, store) = test_app(&dir).await;
        let data = sample_bytes(256);
        put_video(&store, "video-bad-range.mp4", &data).await;

        let response = app
            .oneshot(get_with_range(
                "/media/videos/video-bad-range.mp4",
                Some("bytes=oops"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, data);
    }

    #[tokio::test]
    async fn missing_file_and_unknown_kind_are_not_found() {
        let dir = tempdir().unwrap();
        let (app, _) = test_app(&dir).await;

        let response = app
            .clone()
            .oneshot(get_with_range("/media/videos/video-none.mp4", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(get_with_range("/media/tarballs/file.tar", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_is_idempotent_over_http() {
        let dir = tempdir().unwrap();
        let (app, store) = test_app(&dir).await;
        put_video(&store, "video-gone.mp4", b"bytes").await;

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri("/media/videos/video-gone.mp4")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }
        assert!(
            !store
                .path_for(MediaKind::Videos, "video-gone.mp4")
                .unwrap()
                .exists()
        );
    }

    // --- section upload ---

    struct Part<'a> {
        name: &'a str,
        filename: Option<&'a str>,
        content_type: Option<&'a str>,
        data: &'a [u8],
    }

    fn file_part<'a>(
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    ) -> Part<'a> {
        Part {
            name,
            filename: Some(filename),
            content_type: Some(content_type),
            data,
        }
    }

    fn text_part<'a>(name: &'a str, data: &'a str) -> Part<'a> {
        Part {
            name,
            filename: None,
            content_type: None,
            data: data.as_bytes(),
        }
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part.filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name)
                        .as_bytes(),
                ),
            }
            if let Some(content_type) = part.content_type {
                body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/media/sections")
            .header(header::HOST, "media.test:3000")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    async fn upload(app: Router, parts: &[Part<'_>]) -> (StatusCode, SectionMediaResponse) {
        let response = app.oneshot(upload_request(parts)).await.unwrap();
        let status = response.status();
        let body = body_of(response).await;
        let parsed = serde_json::from_slice(&body).unwrap_or_default();
        (status, parsed)
    }

    async fn dir_entries(store: &MediaStore, kind: MediaKind) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(store.dir(kind)).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    #[tokio::test]
    async fn two_video_upload_yields_ordered_labeled_resolvable_assets() {
        let dir = tempdir().unwrap();
        let (app, store) = test_app(&dir).await;

        let (status, result) = upload(
            app.clone(),
            &[
                file_part("videos", "a.mp4", "video/mp4", b"intro payload"),
                file_part("videos", "b.avi", "video/avi", b"outro payload"),
                text_part("video_labels", r#"["Intro","Outro"]"#),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(result.dropped.len(), 0);
        assert_eq!(result.videos.len(), 2);
        assert_eq!(result.videos[0].label, "Intro");
        assert_eq!(result.videos[1].label, "Outro");
        for asset in &result.videos {
            assert!(asset.filename.starts_with("video-"));
            assert_eq!(asset.fallback, Some(false));
            assert_eq!(
                asset.url,
                format!("http://media.test:3000/media/videos/{}", asset.filename)
            );
        }
        assert!(result.videos[0].filename.ends_with(".mp4"));
        assert!(result.videos[1].filename.ends_with(".avi"));

        // Each URL resolves against the streaming endpoint.
        for asset in &result.videos {
            let response = app
                .clone()
                .oneshot(get_with_range(
                    &format!("/media/videos/{}", asset.filename),
                    None,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_of(response).await, b"encoded bytes");
        }

        // No staged temp files remain.
        let leftovers = dir_entries(&store, MediaKind::Videos).await;
        assert!(
            leftovers.iter().all(|name| name.starts_with("video-")),
            "staged files left behind: {leftovers:?}"
        );
    }

    #[tokio::test]
    async fn encode_failure_falls_back_and_keeps_batch_order() {
        let dir = tempdir().unwrap();
        let (app, _) = test_app(&dir).await;

        let (status, result) = upload(
            app,
            &[
                file_part("videos", "a.mp4", "video/mp4", b"fine"),
                file_part("videos", "b.mp4", "video/mp4", b"this one will fail"),
                file_part("videos", "c.mp4", "video/mp4", b"also fine"),
                text_part("video_labels", r#"["One","Two","Three"]"#),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(result.videos.len(), 3);
        assert_eq!(result.dropped.len(), 0);
        let labels: Vec<&str> = result.videos.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, ["One", "Two", "Three"]);
        assert_eq!(result.videos[0].fallback, Some(false));
        assert_eq!(result.videos[1].fallback, Some(true));
        assert_eq!(result.videos[2].fallback, Some(false));
    }

    #[tokio::test]
    async fn failed_fallback_is_reported_as_partial_success() {
        let dir = tempdir().unwrap();
        let (app, _) = test_app(&dir).await;

        let (status, result) = upload(
            app,
            &[
                file_part("videos", "a.mp4", "video/mp4", b"fine"),
                file_part("videos", "b.mp4", "video/mp4", b"this one will vanish"),
                text_part("video_labels", r#"["Kept","Lost"]"#),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(result.videos.len(), 1);
        assert_eq!(result.videos[0].label, "Kept");
        assert_eq!(result.dropped.len(), 1);
        assert_eq!(result.dropped[0].index, 1);
        assert_eq!(result.dropped[0].label, "Lost");
    }

    #[tokio::test]
    async fn pdf_metadata_is_positional_with_loose_booleans_and_folders() {
        let dir = tempdir().unwrap();
        let (app, _) = test_app(&dir).await;

        let (status, result) = upload(
            app,
            &[
                file_part("pdfs", "notes.pdf", "application/pdf", b"%PDF-1.4 notes"),
                file_part("pdfs", "sheet.pdf", "application/pdf", b"%PDF-1.4 sheet"),
                text_part("pdf_labels", r#"["Notes"]"#),
                text_part("pdf_downloadable", r#"[true,"false"]"#),
                text_part("pdf_folders", r#"["Week1",null]"#),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(result.pdfs.len(), 2);
        assert_eq!(result.pdfs[0].label, "Notes");
        assert_eq!(result.pdfs[0].downloadable, Some(true));
        assert_eq!(result.pdfs[0].folder.as_deref(), Some("Week1"));
        assert!(result.pdfs[0].filename.starts_with("pdf-"));
        // Second PDF falls back to its original filename as label.
        assert_eq!(result.pdfs[1].label, "sheet.pdf");
        assert_eq!(result.pdfs[1].downloadable, Some(false));
        assert_eq!(result.pdfs[1].folder, None);
    }

    #[tokio::test]
    async fn invalid_part_rejects_request_and_discards_staged_siblings() {
        let dir = tempdir().unwrap();
        let (app, store) = test_app(&dir).await;

        let response = app
            .oneshot(upload_request(&[
                file_part("videos", "a.mp4", "video/mp4", b"fine"),
                file_part("videos", "evil.exe", "application/octet-stream", b"nope"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(dir_entries(&store, MediaKind::Videos).await.is_empty());
        assert!(dir_entries(&store, MediaKind::Pdfs).await.is_empty());
    }

    #[tokio::test]
    async fn unexpected_file_field_is_rejected() {
        let dir = tempdir().unwrap();
        let (app, store) = test_app(&dir).await;

        let response = app
            .oneshot(upload_request(&[file_part(
                "attachments",
                "a.mp4",
                "video/mp4",
                b"bytes",
            )]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(dir_entries(&store, MediaKind::Videos).await.is_empty());
    }
}
