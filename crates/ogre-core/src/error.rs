//! Error types for ogre

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OgreError {
    #[error("Invalid {transform} config: {reason}")]
    InvalidConfig {
        transform: &'static str,
        reason: String,
    },
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Pipeline must contain at least one transform")]
    EmptyPipeline,
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OgreError {
    pub(crate) fn config(transform: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            transform,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OgreError>;
