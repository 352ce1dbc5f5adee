//! # Error Types
//!
//! Typed errors for the boundaries of the pipeline. Orchestration code wraps
//! these in `anyhow` with file/preset context.

use thiserror::Error;

/// Failure talking to the remote parsing service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request to parsing service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("parsing service rejected '{action}': {message}")]
    Rejected { action: String, message: String },
    #[error("unexpected reply to '{action}': {details}")]
    UnexpectedReply { action: String, details: String },
    #[error("ping answered '{0}' instead of 'pong'")]
    NotPong(String),
}

/// Failure while waiting for a job to settle
#[derive(Debug, Error)]
pub enum PollError {
    #[error("job {job_id} did not settle within {waited_secs}s ({attempts} polls)")]
    DeadlineExceeded {
        job_id: String,
        waited_secs: u64,
        attempts: u32,
    },
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Invalid value in the settings file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("line {line}: '{key}' has invalid value '{value}': {reason}")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
        reason: String,
    },
    #[error("unknown text encoding '{0}'")]
    UnknownEncoding(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
