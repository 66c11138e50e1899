use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::oracles::{OracleCallError, SynthesisError};

/// Unique error codes for client identification
#[derive(Debug, Clone, Copy)]
pub enum ErrorCode {
    // Validation errors (2xxx)
    ValidationFailed = 2001,

    // External service errors (5xxx)
    OracleFailure = 5001,
    SpeechSynthesisFailure = 5002,

    // Internal errors (9xxx)
    InternalError = 9001,
    ConfigurationError = 9002,
}

impl ErrorCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// An oracle call inside the resolver pipeline failed. Carries the
    /// pipeline stage so the caller can tell which round trip broke.
    #[error("{stage} oracle call failed: {source}")]
    Oracle {
        stage: &'static str,
        #[source]
        source: OracleCallError,
    },

    #[error(transparent)]
    Speech(#[from] SynthesisError),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
}

impl AppError {
    /// Adapter for mapping an oracle failure to its pipeline stage:
    /// `.map_err(AppError::oracle("embed"))`
    pub fn oracle(stage: &'static str) -> impl FnOnce(OracleCallError) -> AppError {
        move |source| AppError::Oracle { stage, source }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ValidationError(_) => ErrorCode::ValidationFailed,
            Self::Oracle { .. } => ErrorCode::OracleFailure,
            Self::Speech(_) => ErrorCode::SpeechSynthesisFailure,
            Self::InternalError(_) => ErrorCode::InternalError,
            Self::ConfigError(_) => ErrorCode::ConfigurationError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Oracle { .. } => StatusCode::BAD_GATEWAY,
            Self::Speech(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        match &self {
            AppError::ValidationError(_) => {
                tracing::debug!(error_code = error_code.as_u16(), %message, "Client error");
            }
            AppError::Oracle { stage, .. } => {
                tracing::error!(error_code = error_code.as_u16(), stage = %stage, %message, "Oracle error");
            }
            _ => {
                tracing::error!(error_code = error_code.as_u16(), %message, error = ?self, "Server error");
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code.as_u16(),
                "status": status.as_u16(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
