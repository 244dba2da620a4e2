use thiserror::Error;

use crate::error::{ErrorCategory, RecoverySuggestion};

/// Longest remote response body kept inside an error value.
pub(crate) const MAX_REMOTE_BODY: usize = 512;

/// Authentication errors for the whole sign-in lifecycle.
///
/// Display text never includes a client secret or an access token; remote
/// bodies are truncated to [`MAX_REMOTE_BODY`] characters.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid instance: {0}")]
    InvalidInstance(String),
    #[error("App registration with {instance} failed{}", describe_remote(.status, .body))]
    RegistrationFailed {
        instance: String,
        status: Option<u16>,
        body: String,
    },
    #[error("Missing code or state in callback")]
    MissingParameters,
    #[error("No pending authorization for this session")]
    NoPendingAuthorization,
    #[error("State parameter does not match the pending authorization")]
    StateMismatch,
    #[error("Authorization was denied on the instance")]
    AccessDenied,
    #[error("Token exchange failed{}", describe_remote(.status, .body))]
    TokenExchangeFailed { status: Option<u16>, body: String },
    #[error("Session validation failed: {0}")]
    ValidationFailed(String),
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Instance API error{}", describe_api(.status, .body))]
    Api { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Storage error: {0}")]
    StorageFailed(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    pub(crate) fn registration(instance: &str, status: Option<u16>, body: &str) -> Self {
        Self::RegistrationFailed {
            instance: instance.to_string(),
            status,
            body: truncate_body(body),
        }
    }

    pub(crate) fn token_exchange(status: Option<u16>, body: &str) -> Self {
        Self::TokenExchangeFailed {
            status,
            body: truncate_body(body),
        }
    }

    pub(crate) fn api(status: u16, body: &str) -> Self {
        Self::Api {
            status,
            body: truncate_body(body),
        }
    }

    /// Failures of the anti-forgery checks. These abort the flow and are
    /// never retried.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingParameters | Self::NoPendingAuthorization | Self::StateMismatch
        )
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingParameters | Self::NoPendingAuthorization | Self::StateMismatch => {
                ErrorCategory::Security
            }
            Self::InvalidInstance(_) => ErrorCategory::Input,
            Self::AccessDenied | Self::NotSignedIn | Self::ValidationFailed(_) => {
                ErrorCategory::Authentication
            }
            Self::RegistrationFailed { status, .. } | Self::TokenExchangeFailed { status, .. } => {
                match status {
                    None => ErrorCategory::Network,
                    Some(500..=599) => ErrorCategory::Server,
                    Some(_) => ErrorCategory::Remote,
                }
            }
            Self::Api { status, .. } => match status {
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Remote,
            },
            Self::Network(_) => ErrorCategory::Network,
            Self::StorageFailed(_) => ErrorCategory::Storage,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether the caller may reasonably retry. The library itself never does.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Server
        )
    }

    /// Suggest what the caller should do next.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Security | ErrorCategory::Authentication => {
                RecoverySuggestion::RestartSignIn
            }
            ErrorCategory::Network | ErrorCategory::Server => RecoverySuggestion::RetryLater,
            ErrorCategory::Input | ErrorCategory::Remote => RecoverySuggestion::CheckInstance,
            ErrorCategory::Storage => RecoverySuggestion::CheckStorage,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
        }
    }

    /// Short, non-sensitive reason suitable for a sign-in page redirect.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidInstance(_) => "That does not look like an instance address",
            Self::RegistrationFailed { .. } => "Could not register with that instance",
            Self::MissingParameters => "Missing required parameters",
            Self::NoPendingAuthorization => "Sign-in session expired, please try again",
            Self::StateMismatch => "Invalid state parameter",
            Self::AccessDenied => "Authorization was denied",
            Self::TokenExchangeFailed { .. } => {
                "Failed to exchange authorization code for token"
            }
            Self::ValidationFailed(_) | Self::NotSignedIn => "Please sign in again",
            Self::Api { .. } | Self::Network(_) => "The instance could not be reached",
            Self::StorageFailed(_) => "Local session storage is unavailable",
            Self::Configuration(_) => "Sign-in is not configured correctly",
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.without_url().to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::StorageFailed(error.to_string())
    }
}

/// Only the parser message is kept; the full display quotes the offending
/// line, which may hold a token or client secret.
impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::StorageFailed(format!("unreadable record: {}", error.message()))
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::StorageFailed(error.to_string())
    }
}

fn describe_remote(status: &Option<u16>, body: &str) -> String {
    match (status, body.trim()) {
        (Some(status), "") => format!(" (HTTP {status})"),
        (Some(status), body) => format!(" (HTTP {status}): {body}"),
        (None, "") => String::new(),
        (None, body) => format!(": {body}"),
    }
}

fn describe_api(status: &u16, body: &str) -> String {
    describe_remote(&Some(*status), body)
}

pub(crate) fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_REMOTE_BODY) {
        Some((end, _)) => format!("{}...", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}
