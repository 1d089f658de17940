//! Error types for the exchange
//!
//! Comprehensive error taxonomy using thiserror. Business-rule rejections,
//! market-outcome rejections and system failures are kept distinct so every
//! caller can tell "fix your order" from "the market said no" from "retry".

use thiserror::Error;

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Match error: {0}")]
    Match(#[from] MatchError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Price ingestion errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("Malformed tick: {reason}")]
    MalformedTick { reason: String },

    #[error("Price conflict for {key}: stored {existing}, received {incoming}")]
    PriceConflict {
        key: String,
        existing: String,
        incoming: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Order admission rejections (business rules, never partially applied)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("{message}")]
    MarketClosed { message: String },

    #[error("Order limit exceeded: {current}/{max} orders already placed for this {slot_label}")]
    SlotLimitExceeded {
        current: usize,
        max: usize,
        slot_label: String,
    },

    #[error("{message}")]
    InsufficientPosition { message: String },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

/// Order lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order not found: {order_id}")]
    NotFound { order_id: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

/// Matching pass failures (transient, retry-safe)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("Matching failed for {key}: {reason}; no order was changed, retry the tick")]
    MatchingFailed { key: String, reason: String },
}

/// Persistence-layer failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),
}

/// Settlement failures; the previously promoted record is left intact
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Order {order_id} cannot be settled: {reason}")]
    NotSettleable { order_id: String, reason: String },

    #[error("Bucket index {index} out of range (0..12)")]
    BucketOutOfRange { index: usize },

    #[error("No settlement record for {key}")]
    RecordNotFound { key: String },
}
