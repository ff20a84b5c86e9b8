// Error types for the aggregation pipeline.
// None of these are fatal: callers log them and keep the pipeline running.

use thiserror::Error;

/// A datagram that is not well-formed line protocol. Drops that datagram only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("datagram is not valid UTF-8")]
    InvalidUtf8,

    #[error("line {line}: missing measurement name")]
    MissingMeasurement { line: usize },

    #[error("line {line}: missing field set")]
    MissingFields { line: usize },

    #[error("line {line}: malformed tag {tag:?}")]
    MalformedTag { line: usize, tag: String },

    #[error("line {line}: malformed field {field:?}")]
    MalformedField { line: usize, field: String },

    #[error("line {line}: unterminated string field value")]
    UnterminatedString { line: usize },

    #[error("line {line}: invalid timestamp {value:?}")]
    InvalidTimestamp { line: usize, value: String },
}

/// Failure to hand a sealed window to the downstream sink.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("downstream I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode window: {0}")]
    Encode(String),
}

/// Failure to route an observation into the open window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("scheduler is shut down; no window is open")]
    Closed,

    #[error("window {0} dispatcher is gone")]
    DispatcherGone(u64),
}
