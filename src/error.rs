// src/error.rs
//! Error taxonomy shared by every observer.

use std::time::Duration;
use thiserror::Error;

/// Coarse category of an [`ObserverError`], used for diagnostics and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Connection,
    Fetch,
    SideEffect,
    InvalidState,
    Timeout,
    Panic,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Connection => "connection",
            ErrorKind::Fetch => "fetch",
            ErrorKind::SideEffect => "side_effect",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Panic => "panic",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ObserverError {
    /// Missing credentials or a disabled source. Raised before any connection attempt.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not connect to {source_name}: {reason}")]
    Connection { source_name: String, reason: String },

    /// A provider call failed while enumerating candidates.
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("marking {item_id} as consumed failed: {reason}")]
    SideEffect { item_id: String, reason: String },

    #[error("invalid observer state: {0}")]
    InvalidState(&'static str),

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// An adapter panicked mid-cycle. Contained to that source.
    #[error("observer panicked: {0}")]
    Panicked(String),
}

impl ObserverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ObserverError::Configuration(_) => ErrorKind::Configuration,
            ObserverError::Connection { .. } => ErrorKind::Connection,
            ObserverError::Fetch(_) => ErrorKind::Fetch,
            ObserverError::SideEffect { .. } => ErrorKind::SideEffect,
            ObserverError::InvalidState(_) => ErrorKind::InvalidState,
            ObserverError::Timeout(_) => ErrorKind::Timeout,
            ObserverError::Panicked(_) => ErrorKind::Panic,
        }
    }

    pub fn connection(source_name: impl Into<String>, reason: impl ToString) -> Self {
        ObserverError::Connection {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn side_effect(item_id: impl Into<String>, reason: impl ToString) -> Self {
        ObserverError::SideEffect {
            item_id: item_id.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for ObserverError {
    fn from(e: reqwest::Error) -> Self {
        ObserverError::Fetch(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(
            ObserverError::Configuration("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            ObserverError::side_effect("42", "boom").kind(),
            ErrorKind::SideEffect
        );
        assert_eq!(
            ObserverError::Timeout(Duration::from_secs(1)).kind().as_str(),
            "timeout"
        );
    }

    #[test]
    fn messages_name_the_item() {
        let e = ObserverError::side_effect("42", "HTTP 500");
        assert_eq!(e.to_string(), "marking 42 as consumed failed: HTTP 500");
    }
}
