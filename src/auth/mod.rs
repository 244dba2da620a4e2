//! Dynamic multi-instance OAuth sign-in and local session storage.

pub mod authorize;
pub mod callback;
pub mod credential;
pub mod error;
pub mod instance;
pub mod pending;
pub mod registry;
pub mod service;
pub mod store;
pub mod validator;

pub use authorize::{generate_state, AuthorizationUrlBuilder};
pub use callback::{parse_callback_url, CallbackExchanger, CallbackParams};
pub use credential::{Credential, Profile, ProfileField};
pub use error::AuthError;
pub use instance::{normalize_instance_host, parse_handle};
pub use pending::{
    new_session_key, FilePendingStore, MemoryPendingStore, PendingAuthorization, PendingStore,
};
pub use registry::{InstanceAppCredential, InstanceAppRegistry};
pub use service::{redirect_target, AuthService, SignInStep};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use validator::{SessionValidator, ValidationResult};
