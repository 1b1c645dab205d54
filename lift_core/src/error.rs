//! Error types for the lift_core library.

use std::io;
use uuid::Uuid;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for lift_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A session command was issued in a state that does not accept it
    #[error("cannot {command} while {state}")]
    InvalidTransition {
        command: &'static str,
        state: crate::engine::SessionState,
    },

    /// A workout plan failed validation
    #[error("Invalid workout template: {0}")]
    InvalidTemplate(String),

    /// A record with this id is already in the workout log
    #[error("Session {0} is already in the workout log")]
    DuplicateId(Uuid),

    /// The workout log could not be written or read
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller can simply ignore the failure and carry on.
    ///
    /// Only a rejected command qualifies: the engine is untouched and the
    /// front end should just disable the control.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::InvalidTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SessionState;

    #[test]
    fn test_only_invalid_transition_is_recoverable() {
        let rejected = Error::InvalidTransition {
            command: "complete a set",
            state: SessionState::Resting,
        };
        assert!(rejected.is_recoverable());
        assert_eq!(rejected.to_string(), "cannot complete a set while resting");

        assert!(!Error::InvalidTemplate("no exercises".into()).is_recoverable());
        assert!(!Error::DuplicateId(Uuid::nil()).is_recoverable());
        assert!(!Error::Persistence("disk full".into()).is_recoverable());
    }
}
