use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use types::errors::{AdmissionError, EngineError, IngestError, OrderError};

/// Central error type for the Gateway application
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Status, machine code and human-readable detail
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Engine(err) => engine_parts(err),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone()),
        }
    }
}

fn engine_parts(err: &EngineError) -> (StatusCode, &'static str, String) {
    let detail = match err {
        // Admission messages are shown to traders verbatim
        EngineError::Admission(inner) => inner.to_string(),
        EngineError::Ingest(inner) => inner.to_string(),
        EngineError::Order(inner) => inner.to_string(),
        other => other.to_string(),
    };

    let (status, code) = match err {
        EngineError::Ingest(IngestError::MalformedTick { .. }) => {
            (StatusCode::BAD_REQUEST, "MALFORMED_TICK")
        }
        EngineError::Ingest(IngestError::PriceConflict { .. }) => {
            (StatusCode::CONFLICT, "PRICE_CONFLICT")
        }
        EngineError::Ingest(IngestError::Store(_)) | EngineError::Store(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
        }
        EngineError::Admission(AdmissionError::MarketClosed { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "MARKET_CLOSED")
        }
        EngineError::Admission(AdmissionError::SlotLimitExceeded { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "SLOT_LIMIT_EXCEEDED")
        }
        EngineError::Admission(AdmissionError::InsufficientPosition { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_POSITION")
        }
        EngineError::Admission(AdmissionError::InvalidOrder(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ORDER")
        }
        EngineError::Order(OrderError::NotFound { .. }) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        EngineError::Order(OrderError::InvalidStateTransition { .. }) => {
            (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
        }
        EngineError::Match(_) => (StatusCode::SERVICE_UNAVAILABLE, "MATCHING_FAILED"),
        EngineError::Settlement(_) => (StatusCode::SERVICE_UNAVAILABLE, "SETTLEMENT_FAILED"),
    };

    (status, code, detail)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, detail) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        }

        let body = Json(json!({
            "error": code,
            "detail": detail
        }));

        (status, body).into_response()
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("ingestion task failed: {err}"))
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        AppError::Engine(err.into())
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        AppError::Engine(err.into())
    }
}
