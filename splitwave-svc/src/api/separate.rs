//! Track rendering for an analysed session

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::decode_audio_file;
use crate::models::TrackUpload;
use crate::separation::{RenderedTrack, SeparationEngine, SeparationRequest};
use crate::utils::run_with_deadline;
use crate::{ApiError, ApiResult, AppState};

/// POST /separate-audio body
#[derive(Debug, Deserialize)]
pub struct SeparateRequest {
    pub session_id: String,
    pub selected_instruments: Vec<SeparationRequest>,
}

#[derive(Debug, Serialize)]
pub struct TrackInfo {
    pub name: String,
    #[serde(serialize_with = "crate::models::instrument::serialize_2dp")]
    pub duration: f64,
    pub sample_rate: u32,
    pub sub_parts: Vec<String>,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct SeparateResponse {
    pub session_id: Uuid,
    pub tracks: Vec<TrackInfo>,
}

/// POST /separate-audio
///
/// Renders every selected instrument from the stored source. Tracks are
/// committed only when all of them rendered; an earlier track with the same
/// name is replaced.
pub async fn separate_audio(
    State(state): State<AppState>,
    payload: Result<Json<SeparateRequest>, JsonRejection>,
) -> ApiResult<Json<SeparateResponse>> {
    state.sweep().await;

    let Json(request) = payload.map_err(|e| ApiError::Validation(format!("Missing data: {}", e.body_text())))?;
    let session_id = Uuid::parse_str(&request.session_id)
        .map_err(|_| ApiError::NotFound("Original file not found".to_string()))?;

    let (_, source_path) = state.store.source_artifact(session_id).await?;
    let requests = request.selected_instruments;
    let count = requests.len();

    let rendered = run_with_deadline(state.config.processing_timeout(), move |cancel| -> ApiResult<Vec<RenderedTrack>> {
        let audio = decode_audio_file(&source_path).map_err(|e| {
            ApiError::processing(
                "decode",
                format!("{} (source file present: {})", e, source_path.exists()),
            )
        })?;
        if cancel.is_cancelled() {
            return Err(ApiError::processing("timeout", "cancelled after decode"));
        }
        SeparationEngine::new()
            .separate(&audio, &requests, &cancel)
            .map_err(ApiError::from)
    })
    .await
    .map_err(ApiError::from)
    .and_then(|result| result);

    let rendered: Vec<RenderedTrack> = match rendered {
        Ok(tracks) => tracks,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Separation failed");
            state.record_error(e.to_string()).await;
            return Err(e);
        }
    };

    let mut uploads = Vec::with_capacity(rendered.len());
    let mut tracks = Vec::with_capacity(rendered.len());
    for track in rendered {
        tracks.push(TrackInfo {
            name: track.name.clone(),
            duration: track.duration,
            sample_rate: track.sample_rate,
            sub_parts: track.sub_parts,
            download_url: format!("/download/{}/{}", session_id, track.key),
        });
        uploads.push(TrackUpload {
            key: track.key,
            label: track.name,
            sample_rate: track.sample_rate,
            duration: track.duration,
            bytes: track.wav,
        });
    }
    state.store.commit_tracks(session_id, uploads).await?;

    info!(session_id = %session_id, tracks = count, "Audio separation completed");

    Ok(Json(SeparateResponse { session_id, tracks }))
}

pub fn separate_routes() -> Router<AppState> {
    Router::new().route("/separate-audio", post(separate_audio))
}
