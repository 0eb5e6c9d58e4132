//! Error types for portprobe
//!
//! `ParseError` covers caller-facing specification mistakes; `PortprobeError`
//! covers the few failures that abort a whole batch. Per-probe failures never
//! show up here: they resolve into a `PortState`.

use std::io;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid range '{segment}': {reason}")]
    InvalidRange { segment: String, reason: String },

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("specification yielded no {0}")]
    EmptyResult(&'static str),
}

impl ParseError {
    pub fn range(segment: &str, reason: impl Into<String>) -> Self {
        ParseError::InvalidRange {
            segment: segment.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PortprobeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Scanner not available: {0}")]
    ScannerUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Result type alias for portprobe operations
pub type PortprobeResult<T> = Result<T, PortprobeError>;
