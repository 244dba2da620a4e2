//! Convenience re-exports for common use.

pub use crate::auth::{
    parse_callback_url, redirect_target, AuthService, Credential, CredentialStore, Profile,
    SignInStep, ValidationResult,
};
pub use crate::client::{InstanceClient, Status};
pub use crate::config::ClientConfig;
pub use crate::error::{AuthError, Result};
