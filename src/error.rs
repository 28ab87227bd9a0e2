//! Error types for the lottery pipeline

use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Too few historical periods or labeled rows to do the work
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Realized results for a prediction have not landed yet (holiday, late crawl)
    #[error("Result not available yet: {0}")]
    MissingResult(String),

    #[error("No active model for {0}")]
    NoActiveModel(String),

    /// Partial feature sets, dual-active registry entries, digest mismatches
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Model artifact error: {0}")]
    Artifact(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// How a per-station failure is reported in a run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reported and skipped; the batch continues
    DataInsufficiency,
    /// Not an error: retried on the next run
    MissingResult,
    /// Fatal for the station operation
    Integrity,
    /// Store, classifier backend, filesystem or network
    External,
}

impl BotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BotError::InsufficientData(_) | BotError::NoActiveModel(_) => {
                ErrorKind::DataInsufficiency
            }
            BotError::MissingResult(_) => ErrorKind::MissingResult,
            BotError::Integrity(_) | BotError::InvalidInput(_) => ErrorKind::Integrity,
            _ => ErrorKind::External,
        }
    }
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        BotError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
