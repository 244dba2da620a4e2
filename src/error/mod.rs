//! Error types for fedauth.

pub use crate::auth::error::AuthError;

use strum::Display;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// Anti-forgery checks failed; the flow must restart.
    Security,
    /// The remote rejected or no longer accepts the user's authorization.
    Authentication,
    /// Caller input was malformed.
    Input,
    /// The instance could not be reached.
    Network,
    /// The instance answered with a 5xx.
    Server,
    /// The instance answered with a non-success status below 500.
    Remote,
    Storage,
    Configuration,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RestartSignIn,
    RetryLater,
    CheckInstance,
    CheckStorage,
    CheckConfiguration,
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AuthError>;
