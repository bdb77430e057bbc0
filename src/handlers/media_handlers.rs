//! Media delivery handlers: byte-range streaming and idempotent deletion.
//!
//! The GET path implements HTTP range semantics exactly — `Accept-Ranges`,
//! `Content-Range`, `Content-Length` and the 200/206/416 status codes are
//! contract surface for browser video players; any deviation breaks
//! seeking. The endpoint is deliberately unauthenticated: media URLs act
//! as bearer capability tokens once a client holds the link.

use crate::{
    errors::AppError, models::asset::MediaKind, services::media_store::MediaError,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::io::SeekFrom;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use tracing::debug;

fn parse_kind(segment: &str) -> Result<MediaKind, AppError> {
    MediaKind::parse(segment)
        .ok_or_else(|| AppError::not_found(format!("unknown media kind `{segment}`")))
}

/// `GET /media/{kind}/{filename}`
///
/// Without a `Range` header (or with an unparseable one) the whole file is
/// streamed with status 200. A satisfiable `bytes=start-end` range yields
/// 206 with exactly the requested inclusive window; a start at or beyond
/// EOF yields 416. Only the first range of a multi-range header is
/// honored. Each request opens its own file handle and streams the byte
/// window from disk; nothing is buffered whole.
pub async fn get_media(
    State(state): State<AppState>,
    Path((kind, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let kind = parse_kind(&kind)?;
    let path = state.store.path_for(kind, &filename)?;

    let mut file = File::open(&path)
        .await
        .map_err(|_| MediaError::NotFound(filename.clone()))?;
    let size = file
        .metadata()
        .await
        .map_err(|_| MediaError::NotFound(filename.clone()))?
        .len();

    let range = headers
        .get(header::RANGE)
        .and_then(|value| parse_range_header(value, size));

    let mut response = if let Some((start, end)) = range {
        if start >= size {
            debug!(%filename, start, size, "unsatisfiable range");
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            response.headers_mut().insert(
                header::CONTENT_RANGE,
                format!("bytes */{}", size).parse().unwrap(),
            );
            response
        } else {
            let end = end.min(size.saturating_sub(1));
            let length = end - start + 1;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|err| AppError::internal(format!("seek failed: {err}")))?;
            let stream = ReaderStream::new(file.take(length));
            let mut response = Body::from_stream(stream).into_response();
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            response.headers_mut().insert(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, size).parse().unwrap(),
            );
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, length.to_string().parse().unwrap());
            response
        }
    } else {
        let stream = ReaderStream::new(file);
        let mut response = Body::from_stream(stream).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, size.to_string().parse().unwrap());
        response
    };

    response
        .headers_mut()
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(mime) = mime_guess::from_path(&path).first()
        && let Ok(value) = mime.to_string().parse()
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }

    Ok(response)
}

/// `DELETE /media/{kind}/{filename}`
///
/// Triggered by parent-entity (section/course) deletion. Idempotent: a
/// missing file is not an error, since entity deletion may repeat after a
/// prior partial delete. Always 204 on success-or-already-missing.
pub async fn delete_media(
    State(state): State<AppState>,
    Path((kind, filename)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let kind = parse_kind(&kind)?;
    state.store.delete(kind, &filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Parse a `Range` header against the file size, returning the inclusive
/// `(start, end)` window of the first range. `None` means "serve the whole
/// file" — absent unit, garbage, and empty ranges all degrade rather than
/// error. Multi-range requests are not supported; only the first range is
/// taken (known limitation).
fn parse_range_header(value: &HeaderValue, size: u64) -> Option<(u64, u64)> {
    let value = value.to_str().ok()?;
    let value = value.trim();
    let mut parts = value.split('=');
    let unit = parts.next()?.trim();
    if unit != "bytes" {
        return None;
    }
    let ranges = parts.next()?.trim();
    let range = ranges.split(',').next()?.trim();
    if range.is_empty() {
        return None;
    }
    let (start_str, end_str) = range.split_once('-')?;

    if start_str.is_empty() {
        // Suffix range: "-N" means last N bytes.
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        if suffix_len >= size {
            return Some((0, size.saturating_sub(1)));
        }
        return Some((size - suffix_len, size.saturating_sub(1)));
    }

    let start: u64 = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        size.saturating_sub(1)
    } else {
        end_str.parse().ok()?
    };
    if end < start {
        return None;
    }
    Some((start, end))
}
