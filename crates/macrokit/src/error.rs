//! Structured errors shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input hooks could not be installed (permissions, platform).
    CaptureUnavailable,
    /// A single synthetic-input call failed; recovered locally.
    DispatchFailed,
    /// Screenshot / template match / OCR failure.
    DetectionFailed,
    /// File read/write failure on save or load.
    Io,
    /// Malformed macro file.
    Parse,
    /// Rejected before a session starts: bad speed, empty log, ...
    InvalidConfiguration,
    /// A conflicting session is active.
    Busy,
    Unknown,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn capture_unavailable(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::CaptureUnavailable, reason)
    }

    pub fn dispatch_failed(what: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::DispatchFailed,
            format!("{} failed: {}", what, reason),
        )
    }

    pub fn detection_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::DetectionFailed, reason)
    }

    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, reason)
    }

    pub fn busy(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::Busy, reason)
    }

    pub fn parse(reason: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Parse, reason.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorCode::Parse, e.to_string())
    }
}
