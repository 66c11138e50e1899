use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::AppError;
use crate::services::AppState;

/// Standalone image endpoint renders larger, portrait images than the
/// inline chat attachments.
const IMAGE_SIZE: &str = "1024x1792";

const DEFAULT_VOICE: &str = "alloy";

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    prompt: String,
}

/// Always answers 200; a failed generation carries an empty url plus the
/// error text so the UI can degrade in place.
#[instrument(skip(state, payload))]
pub async fn generate_image(
    State(state): State<AppState>,
    Json(payload): Json<GenerateImageRequest>,
) -> impl IntoResponse {
    match state.images.generate_image(&payload.prompt, IMAGE_SIZE).await {
        Ok(url) => Json(json!({ "url": url })),
        Err(error) => {
            tracing::warn!(%error, "Image generation failed");
            Json(json!({ "url": "", "error": error.to_string() }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    text: String,
    voice: Option<String>,
}

#[instrument(skip(state, payload))]
pub async fn tts(
    State(state): State<AppState>,
    Json(payload): Json<TtsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let voice = payload.voice.as_deref().unwrap_or(DEFAULT_VOICE);
    let audio = state.speech.synthesize(&payload.text, voice).await?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_is_optional() {
        let req: TtsRequest = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(req.voice, None);
        assert_eq!(req.voice.as_deref().unwrap_or(DEFAULT_VOICE), "alloy");
    }
}
