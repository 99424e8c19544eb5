//! Error types for stream limit enforcement

use std::time::Duration;
use thiserror::Error;

/// Malformed playback-start event; dropped without enforcement
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("event carries no users")]
    NoUsers,

    #[error("event carries an empty session id")]
    MissingSessionId,

    #[error("primary user id is empty after normalization")]
    EmptyUserId,
}

/// Limit table or environment configuration could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("user limits are not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("user limits must be a JSON object, got {0}")]
    WrongShape(&'static str),

    #[error("environment configuration error: {0}")]
    Env(#[from] envy::Error),
}

/// A session registry or media source call failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("call timed out after {0:?}")]
    TimedOut(Duration),
}

impl CollaboratorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CollaboratorError::NotFound(_))
    }
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;
