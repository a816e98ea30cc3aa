//! Upload and instrument detection

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{classification_result, FeatureExtractor};
use crate::audio::{is_allowed_extension, sanitize_filename};
use crate::models::ClassificationResult;
use crate::utils::run_with_deadline;
use crate::{ApiError, ApiResult, AppState};

const UPLOAD_FIELD: &str = "file";

/// Classification plus the handles needed for a follow-up separation
#[derive(Debug, Serialize)]
pub struct DetectResponse {
    #[serde(flatten)]
    pub result: ClassificationResult,
    pub session_id: Uuid,
    pub original_file: String,
}

struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

async fn read_upload(multipart: &mut Multipart) -> ApiResult<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("Failed to read upload: {}", e)))?;

        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    Err(ApiError::Validation("No file provided".to_string()))
}

/// POST /detect-instruments
///
/// Stores the upload as a new session, analyses it and returns the ranked
/// instrument candidates. A failed analysis keeps the session so the source
/// can still be inspected or cleaned up.
pub async fn detect_instruments(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<DetectResponse>> {
    state.sweep().await;

    let upload = read_upload(&mut multipart).await?;
    if upload.file_name.trim().is_empty() {
        return Err(ApiError::Validation("No file selected".to_string()));
    }
    if !is_allowed_extension(&upload.file_name) {
        return Err(ApiError::Validation("Invalid file type".to_string()));
    }
    if upload.bytes.is_empty() {
        return Err(ApiError::Validation("Uploaded file is empty".to_string()));
    }
    let file_name = sanitize_filename(&upload.file_name)
        .filter(|name| is_allowed_extension(name))
        .ok_or_else(|| ApiError::Validation("Invalid file name".to_string()))?;

    let session_id = Uuid::new_v4();
    state.store.create(session_id, &file_name, &upload.bytes).await?;
    let (_, source_path) = state.store.source_artifact(session_id).await?;

    let features = run_with_deadline(state.config.processing_timeout(), move |cancel| {
        FeatureExtractor::new().extract_file(&source_path, &cancel)
    })
    .await
    .map_err(ApiError::from)
    .and_then(|result| result.map_err(ApiError::from));

    let features = match features {
        Ok(features) => features,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Instrument detection failed");
            state.record_error(e.to_string()).await;
            return Err(e);
        }
    };

    state
        .store
        .mark_analyzed(session_id, features.sample_rate, features.duration)
        .await?;

    let result = classification_result(&features);
    info!(
        session_id = %session_id,
        file = %file_name,
        instruments = result.instruments.len(),
        "Instrument detection completed"
    );

    Ok(Json(DetectResponse {
        result,
        session_id,
        original_file: file_name,
    }))
}

pub fn analyze_routes() -> Router<AppState> {
    Router::new().route("/detect-instruments", post(detect_instruments))
}
