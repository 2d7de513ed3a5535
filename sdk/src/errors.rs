//! Error types and handling
//!
//! This module provides the error types shared by the engine and the game
//! adapter. Errors implement the `ErrorExt` trait which provides a short
//! user-facing hint and indicates whether the error is recoverable.
//!
//! Two families exist:
//!
//! - [`PrimitiveError`]: raised by `ActionPrimitives` implementations when a
//!   movement, dig, place or craft call fails.
//! - [`EngineError`]: raised by the engine itself (configuration, storage,
//!   malformed task requests).

use thiserror::Error;

/// Trait for error extensions
///
/// Hints are safe to show in game chat. They are short and never contain
/// internals such as file paths.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors leave the agent idle and safe; a fresh attempt on a
    /// later tick may succeed. Non-recoverable errors mean the adapter is in a
    /// state the engine cannot reason about.
    fn is_recoverable(&self) -> bool;
}

/// Failure of an atomic world action
///
/// # Examples
///
/// ```
/// use sdk::errors::{ErrorExt, PrimitiveError};
///
/// let error = PrimitiveError::PathBlocked("no path to (3, 64, 2)".to_string());
/// assert!(error.is_recoverable());
///
/// let fatal = PrimitiveError::Disconnected;
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    #[error("Path blocked: {0}")]
    PathBlocked(String),

    #[error("Target gone: {0}")]
    TargetGone(String),

    #[error("Item not in inventory: {0}")]
    NoItem(String),

    #[error("Action interrupted")]
    Interrupted,

    #[error("Action timed out")]
    Timeout,

    #[error("Client disconnected")]
    Disconnected,

    #[error("Action failed: {0}")]
    Other(String),
}

impl ErrorExt for PrimitiveError {
    fn user_hint(&self) -> &str {
        match self {
            Self::PathBlocked(_) => "can't get there, the way is blocked",
            Self::TargetGone(_) => "it's gone already",
            Self::NoItem(_) => "don't have that on me",
            Self::Interrupted => "got interrupted",
            Self::Timeout => "took too long, giving up",
            Self::Disconnected => "lost connection",
            Self::Other(_) => "something went wrong",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite operation failures
/// - **Task**: Malformed or unsupported task requests
/// - **Precondition**: Unknown item names, malformed coordinates
/// - **Primitive**: A wrapped [`PrimitiveError`]
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::UnknownTaskKind("dance".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Task errors
    #[error("Unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("Invalid task spec: {0}")]
    InvalidTaskSpec(String),

    // Precondition errors
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    // Primitive errors
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Try restarting",
            Self::UnknownTaskKind(_) => "don't know how to do that",
            Self::InvalidTaskSpec(_) => "didn't get what you want me to do",
            Self::UnknownItem(_) => "no idea what that item is",
            Self::InvalidCoordinates(_) => "didn't understand the coordinates",
            Self::Primitive(e) => e.user_hint(),
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Primitive(e) => e.is_recoverable(),
            Self::Config(_) | Self::Io(_) => false,
            _ => true,
        }
    }
}
