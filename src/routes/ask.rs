use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use tracing::instrument;

use crate::errors::AppError;
use crate::oracles::ChatMessage;
use crate::services::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    question: String,
    #[serde(default)]
    history: Vec<ChatMessage>,
}

#[instrument(skip(state, payload))]
pub async fn ask(
    State(state): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.question.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Question cannot be empty".to_string(),
        ));
    }

    let result = state
        .resolver
        .resolve(&payload.question, &payload.history)
        .await?;

    Ok(Json(result))
}
