//! Error handling for DietBuddy
//!
//! This module defines the main error types used throughout the application
//! and provides a unified error handling strategy.

use thiserror::Error;

/// Main error type for DietBuddy application
#[derive(Error, Debug)]
pub enum DietBuddyError {
    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("Telegram download error: {0}")]
    Download(#[from] teloxide::DownloadError),

    #[error("Transcription error: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Channel delivery failed for user {user_id}: {reason}")]
    Channel { user_id: String, reason: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Speech-to-text specific errors
#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("Transcription is disabled")]
    Disabled,

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Transcription request failed: {0}")]
    RequestFailed(String),

    #[error("Transcription timeout")]
    Timeout,

    #[error("Invalid transcription response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for DietBuddy operations
pub type Result<T> = std::result::Result<T, DietBuddyError>;

/// Result type alias for transcription operations
pub type TranscriptionResult<T> = std::result::Result<T, TranscriptionError>;

impl DietBuddyError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            DietBuddyError::Telegram(_) => true,
            DietBuddyError::Download(_) => true,
            DietBuddyError::Transcription(_) => true,
            DietBuddyError::Config(_) => false,
            DietBuddyError::InvalidStateTransition { .. } => false,
            DietBuddyError::Redis(_) => false,
            DietBuddyError::Channel { .. } => true,
            DietBuddyError::Http(_) => true,
            DietBuddyError::UrlParse(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DietBuddyError::Redis(_) => ErrorSeverity::Critical,
            DietBuddyError::Config(_) => ErrorSeverity::Critical,
            DietBuddyError::Transcription(TranscriptionError::Disabled) => ErrorSeverity::Info,
            DietBuddyError::Transcription(_) => ErrorSeverity::Warning,
            DietBuddyError::Channel { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
