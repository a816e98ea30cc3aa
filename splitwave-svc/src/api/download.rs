//! Track downloads, single and bundled

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::StreamExt;
use serde::Deserialize;
use splitwave_common::Error;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::api::parse_session_id;
use crate::archive::build_track_archive;
use crate::utils::run_with_deadline;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    pub delete: Option<String>,
}

impl DownloadParams {
    /// `delete=1|true|yes` (case-insensitive)
    pub fn delete_after(&self) -> bool {
        self.delete
            .as_deref()
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}

fn attachment(content_type: &'static str, file_name: &str, length: Option<u64>, body: Body) -> ApiResult<Response> {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut response = (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response();

    if let Some(length) = length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(response)
}

/// GET /download/:session_id/:instrument
///
/// Streams one track. With `delete` set the whole session is removed once
/// the last chunk has been handed to the connection; an aborted transfer
/// leaves the session in place.
pub async fn download_track(
    State(state): State<AppState>,
    Path((session, instrument)): Path<(String, String)>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Response> {
    state.sweep().await;

    let session_id = parse_session_id(&session)?;
    let (artifact, path) = state
        .store
        .get_artifact(session_id, &instrument.to_lowercase())
        .await?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| Error::from_io(e, format!("track '{}' in session {}", instrument, session_id)))?;
    let length = file.metadata().await.ok().map(|m| m.len());
    let file_name = format!("{}.wav", artifact.key);

    if !params.delete_after() {
        return attachment("audio/wav", &file_name, length, Body::from_stream(ReaderStream::new(file)));
    }

    // no Content-Length: the body must be polled to its end for the delete to run
    let store = state.store.clone();
    let mut chunks = ReaderStream::new(file);
    let stream = async_stream::stream! {
        let mut complete = true;
        while let Some(chunk) = chunks.next().await {
            if chunk.is_err() {
                complete = false;
                yield chunk;
                break;
            }
            yield chunk;
        }
        if complete {
            match store.delete_session(session_id).await {
                Ok(_) => info!(session_id = %session_id, "Session deleted after download"),
                Err(e) => warn!(session_id = %session_id, error = %e, "Delete after download failed"),
            }
        }
    };

    attachment("audio/wav", &file_name, None, Body::from_stream(stream))
}

/// GET /download-all/:session_id
///
/// Bundles the session's registered tracks.
pub async fn download_all(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> ApiResult<Response> {
    state.sweep().await;

    let session_id = parse_session_id(&session)?;
    let tracks = state.store.track_files(session_id).await?;

    let archive = run_with_deadline(state.config.processing_timeout(), move |_| {
        build_track_archive(&tracks)
    })
    .await??;

    let length = archive.len() as u64;
    attachment(
        "application/zip",
        &format!("{}_tracks.zip", session_id),
        Some(length),
        Body::from(archive),
    )
}

pub fn download_routes() -> Router<AppState> {
    Router::new()
        .route("/download/:session_id/:instrument", get(download_track))
        .route("/download-all/:session_id", get(download_all))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_flag_values() {
        let params = |v: Option<&str>| DownloadParams {
            delete: v.map(str::to_string),
        };
        assert!(params(Some("1")).delete_after());
        assert!(params(Some("true")).delete_after());
        assert!(params(Some("YES")).delete_after());
        assert!(!params(Some("0")).delete_after());
        assert!(!params(Some("no")).delete_after());
        assert!(!params(None).delete_after());
    }
}
