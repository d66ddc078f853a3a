//! Core Error Types
//!
//! This module defines the error taxonomy used across the chat core.
//! Every failure resolves to a stable machine-readable code plus a
//! human-readable reason string suitable for UI display.
//!
//! # Error Kinds
//!
//! - `InvalidInput` - malformed ID, blank required field
//! - `NotFound` - referenced chat/message/user/request does not exist
//! - `NotAuthorized` - actor lacks the required role or ownership
//! - `AlreadyExists` - operation violates a uniqueness invariant
//! - `AlreadyMember` - user is already a participant of the chat
//! - `InvalidState` - operation violates a state-transition invariant
//! - `Transient` - underlying store is unavailable or timed out
//!
//! # Propagation Policy
//!
//! Read-path queries recover `NotFound` into `false`/`None`/empty results;
//! mutating operations surface it. `NotAuthorized` always surfaces.
//! `Transient` failures from the ephemeral (presence/session) store are
//! swallowed by their callers and treated as "offline"; `Transient` failures
//! from the persisted store always surface.

use thiserror::Error;

/// Errors produced by the chat core
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed or missing input (blank name, empty participant list, ...)
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Human-readable error message
        message: String,
    },

    /// A referenced entity does not exist
    #[error("{entity} not found")]
    NotFound {
        /// The kind of entity that was looked up
        entity: &'static str,
    },

    /// The acting user lacks the required role or ownership
    #[error("not authorized: {message}")]
    NotAuthorized {
        /// Human-readable error message
        message: String,
    },

    /// A uniqueness invariant would be violated
    #[error("{message}")]
    AlreadyExists {
        /// Human-readable error message
        message: String,
    },

    /// The user is already a participant of the chat
    #[error("user is already a member of this chat")]
    AlreadyMember,

    /// The operation violates a state-transition invariant
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Human-readable reason, descriptive enough for UI display
        reason: String,
    },

    /// The underlying store is unavailable or timed out
    #[error("storage unavailable: {message}")]
    Transient {
        /// Human-readable error message
        message: String,
    },
}

impl ChatError {
    /// Create a new invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new not-found error for the given entity kind
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    /// Create a new not-authorized error
    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::NotAuthorized {
            message: message.into(),
        }
    }

    /// Create a new already-exists error
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    /// Create a new invalid-state error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Create a new transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Stable machine-readable error code
    ///
    /// Codes never change between releases; clients may match on them.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::NotFound { .. } => "not_found",
            Self::NotAuthorized { .. } => "not_authorized",
            Self::AlreadyExists { .. } => "already_exists",
            Self::AlreadyMember => "already_member",
            Self::InvalidState { .. } => "invalid_state",
            Self::Transient { .. } => "transient",
        }
    }

    /// Whether this error is a transient store failure
    ///
    /// Transient failures may be retried by the caller; domain errors
    /// must not be.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether this error means a referenced entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound { entity: "record" },
            other => Self::Transient {
                message: other.to_string(),
            },
        }
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input() {
        let error = ChatError::invalid_input("name is blank");
        match error {
            ChatError::InvalidInput { message } => assert_eq!(message, "name is blank"),
            _ => panic!("Expected InvalidInput"),
        }
    }

    #[test]
    fn test_not_found_display() {
        let error = ChatError::not_found("chat");
        assert_eq!(error.to_string(), "chat not found");
        assert!(error.is_not_found());
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ChatError::invalid_input("x").code(), "invalid_input");
        assert_eq!(ChatError::not_found("chat").code(), "not_found");
        assert_eq!(ChatError::not_authorized("x").code(), "not_authorized");
        assert_eq!(ChatError::already_exists("x").code(), "already_exists");
        assert_eq!(ChatError::AlreadyMember.code(), "already_member");
        assert_eq!(ChatError::invalid_state("x").code(), "invalid_state");
        assert_eq!(ChatError::transient("x").code(), "transient");
    }

    #[test]
    fn test_transient_flag() {
        assert!(ChatError::transient("connection refused").is_transient());
        assert!(!ChatError::AlreadyMember.is_transient());
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let error: ChatError = sqlx::Error::RowNotFound.into();
        assert!(error.is_not_found());
    }
}
