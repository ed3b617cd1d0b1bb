use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api::response;
use crate::scraper::ScrapeOutcome;

/// Per-URL detail attached to a comparison whose fetches did not both succeed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScrapeFailureDetails {
    pub yours: ScrapeOutcome,
    pub competitor: ScrapeOutcome,
}

impl std::fmt::Display for ScrapeFailureDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "yours={}, competitor={}",
            self.yours.status(),
            self.competitor.status()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Scraping failed: {0}")]
    ScrapeFailed(Box<ScrapeFailureDetails>),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Analysis error: {0}")]
    AnalysisError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Error parsing content: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl AppError {
    /// Stable machine-readable tag for the error.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ScrapeFailed(_) => "scrape_failed",
            AppError::EmbeddingUnavailable(_) => "embedding_unavailable",
            AppError::EmbeddingError(_) => "embedding",
            AppError::AnalysisError(_) => "analysis",
            AppError::StorageError(_) => "storage",
            AppError::ParseError(_) => "parse",
            AppError::ConfigError(_) => "config",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Timeout(_) => "timeout",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ScrapeFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::EmbeddingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::EmbeddingError(_) => StatusCode::BAD_GATEWAY,
            AppError::ParseError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::AnalysisError(_)
            | AppError::StorageError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        let kind = self.kind();

        match self {
            AppError::ScrapeFailed(details) => {
                response::error_with_data(status, kind, message, *details).into_response()
            }
            _ => response::error::<()>(status, kind, message).into_response(),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::StorageError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
