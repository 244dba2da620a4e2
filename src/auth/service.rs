use std::sync::Arc;

use reqwest::Url;
use tracing::{info, warn};

use super::authorize::{generate_state, AuthorizationUrlBuilder};
use super::callback::CallbackExchanger;
use super::credential::{Credential, Profile};
use super::error::AuthError;
use super::instance::{normalize_instance_host, parse_handle};
use super::pending::{new_session_key, FilePendingStore, PendingStore};
use super::registry::InstanceAppRegistry;
use super::store::{CredentialStore, FileCredentialStore};
use super::validator::{SessionValidator, ValidationResult};
use crate::client::InstanceClient;
use crate::config::ClientConfig;

/// Where the user is sent once a callback has been handled.
pub const SIGN_IN_SUCCESS_PATH: &str = "/?auth=success";
pub const SIGN_IN_PAGE_PATH: &str = "/signin";

/// Subdirectory of the data dir holding pending authorizations.
const PENDING_DIR_NAME: &str = "pending";

/// First half of a sign-in, returned by [`AuthService::sign_in`].
///
/// The caller sends the user to `authorize_url` and keeps `session_key`
/// (in a cookie, or on the command line) until the callback arrives.
#[derive(Debug, Clone)]
pub struct SignInStep {
    pub authorize_url: Url,
    pub session_key: String,
    pub state: String,
    pub instance_host: String,
}

/// Pure service facade for the sign-in lifecycle.
///
/// All I/O decisions (printing, prompting, redirects) belong to the caller.
/// `AuthService` only returns typed results and errors.
///
/// # Example
/// ```no_run
/// use fedauth::auth::AuthService;
/// use fedauth::config::ClientConfig;
///
/// # async fn run() -> fedauth::error::Result<()> {
/// let service = AuthService::from_config(ClientConfig::from_env()?)?;
/// let step = service.sign_in("mastodon.social", "alice").await?;
/// println!("open {}", step.authorize_url);
/// # Ok(())
/// # }
/// ```
pub struct AuthService {
    config: Arc<ClientConfig>,
    registry: Arc<InstanceAppRegistry>,
    urls: AuthorizationUrlBuilder,
    exchanger: CallbackExchanger,
    validator: SessionValidator,
    store: Arc<dyn CredentialStore>,
    pending: Arc<dyn PendingStore>,
    client: reqwest::Client,
}

impl AuthService {
    /// Service using file-backed stores under `config.data_dir`.
    pub fn from_config(config: ClientConfig) -> Result<Self, AuthError> {
        let store = Arc::new(FileCredentialStore::new(&config.data_dir));
        let pending = Arc::new(FilePendingStore::new(
            config.data_dir.join(PENDING_DIR_NAME),
        ));
        Self::new(Arc::new(config), store, pending)
    }

    pub fn new(
        config: Arc<ClientConfig>,
        store: Arc<dyn CredentialStore>,
        pending: Arc<dyn PendingStore>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        let client = config.http_client()?;
        let registry = Arc::new(InstanceAppRegistry::with_client(
            client.clone(),
            config.clone(),
        ));
        Ok(Self::with_registry(client, registry, store, pending))
    }

    /// Share one registry (and its cached registrations) between services.
    pub fn with_registry(
        client: reqwest::Client,
        registry: Arc<InstanceAppRegistry>,
        store: Arc<dyn CredentialStore>,
        pending: Arc<dyn PendingStore>,
    ) -> Self {
        let config = registry.config().clone();
        Self {
            urls: AuthorizationUrlBuilder::new(registry.clone()),
            exchanger: CallbackExchanger::new(
                client.clone(),
                config.clone(),
                store.clone(),
                pending.clone(),
            ),
            validator: SessionValidator::new(client.clone(), config.clone(), store.clone()),
            config,
            registry,
            store,
            pending,
            client,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InstanceAppRegistry> {
        &self.registry
    }

    /// Provisional: true when a credential is stored, without asking the
    /// instance. Use [`AuthService::validate`] to confirm.
    pub fn is_authenticated(&self) -> bool {
        match self.store.get_credential() {
            Ok(credential) => credential.is_some(),
            Err(err) => {
                warn!(error = %err, "cannot read credential store");
                false
            }
        }
    }

    /// Start a sign-in against `instance_host` for `handle`.
    ///
    /// Registers the application with the instance if needed, stores the
    /// pending authorization under a fresh session key and returns the URL
    /// to send the user to.
    pub async fn sign_in(&self, instance_host: &str, handle: &str) -> Result<SignInStep, AuthError> {
        let host = normalize_instance_host(instance_host)?;
        let handle = parse_handle(handle, &host)?;
        let state = generate_state();
        let (authorize_url, pending) = self.urls.begin(&host, &state).await?;

        let session_key = new_session_key();
        self.pending
            .put(&session_key, pending, self.config.pending_ttl())?;
        info!(instance = %host, handle = %handle, "sign-in started");

        Ok(SignInStep {
            authorize_url,
            session_key,
            state,
            instance_host: host,
        })
    }

    /// Finish the sign-in started under `session_key`.
    pub async fn complete_sign_in(
        &self,
        session_key: &str,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<Credential, AuthError> {
        self.exchanger
            .complete_from_store(session_key, code, state)
            .await
    }

    /// Forget the credential and profile. Succeeds when already signed out.
    pub fn sign_out(&self) -> Result<(), AuthError> {
        let instance = self
            .store
            .get_credential()
            .ok()
            .flatten()
            .map(|credential| credential.instance_host);
        self.store.clear()?;
        if let Some(instance) = instance {
            info!(instance = %instance, "signed out");
        }
        Ok(())
    }

    pub fn current_credential(&self) -> Result<Option<Credential>, AuthError> {
        self.store.get_credential()
    }

    /// Stored profile; no network I/O.
    pub fn current_profile(&self) -> Result<Option<Profile>, AuthError> {
        self.store.get_profile()
    }

    pub async fn validate(&self) -> Result<ValidationResult, AuthError> {
        self.validator.validate().await
    }

    pub async fn validate_strict(&self) -> Result<Profile, AuthError> {
        self.validator.validate_strict().await
    }

    /// Client for authenticated calls with the stored credential.
    pub fn instance_client(&self) -> InstanceClient {
        InstanceClient::new(
            self.client.clone(),
            self.config.clone(),
            self.store.clone(),
            self.validator.clone(),
        )
    }
}

/// Path to redirect the browser to after a callback.
///
/// Failures carry [`AuthError::user_message`], never the underlying detail.
pub fn redirect_target<T>(result: &Result<T, AuthError>) -> String {
    match result {
        Ok(_) => SIGN_IN_SUCCESS_PATH.to_string(),
        Err(err) => {
            let query: String = Url::parse("http://localhost/")
                .map(|mut url| {
                    url.query_pairs_mut()
                        .append_pair("error", err.user_message());
                    url.query().unwrap_or_default().to_string()
                })
                .unwrap_or_default();
            format!("{SIGN_IN_PAGE_PATH}?{query}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::pending::MemoryPendingStore;
    use crate::auth::registry::InstanceAppCredential;
    use crate::auth::store::MemoryCredentialStore;

    fn service() -> (AuthService, Arc<MemoryPendingStore>) {
        let pending = Arc::new(MemoryPendingStore::new());
        let service = AuthService::new(
            Arc::new(ClientConfig::default()),
            Arc::new(MemoryCredentialStore::new()),
            pending.clone(),
        )
        .unwrap();
        service.registry().insert(InstanceAppCredential {
            instance_host: "social.example".to_string(),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
        });
        (service, pending)
    }

    #[test]
    fn redirect_target_for_success() {
        let result: Result<(), AuthError> = Ok(());
        assert_eq!(redirect_target(&result), "/?auth=success");
    }

    #[test]
    fn redirect_target_encodes_user_message_only() {
        let result: Result<(), AuthError> = Err(AuthError::token_exchange(
            Some(400),
            "invalid_grant for secret-1",
        ));
        let target = redirect_target(&result);
        assert_eq!(
            target,
            "/signin?error=Failed+to+exchange+authorization+code+for+token"
        );
        assert!(!target.contains("secret-1"));
    }

    #[tokio::test]
    async fn sign_in_stores_pending_under_new_session_key() {
        let (service, pending) = service();
        let step = service.sign_in("social.example", "@alice").await.unwrap();

        assert_eq!(step.instance_host, "social.example");
        assert!(step.authorize_url.as_str().contains(&step.state));
        assert_eq!(pending.len(), 1);
        let record = pending.take(&step.session_key).unwrap().unwrap();
        assert_eq!(record.state, step.state);
        assert_eq!(record.client_id, "client-1");
    }

    #[tokio::test]
    async fn sign_in_rejects_empty_handle_before_any_registration() {
        let (service, pending) = service();
        let err = service.sign_in("other.example", "  ").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingParameters));
        assert!(pending.is_empty());
        assert!(service.registry().cached("other.example").is_none());
    }

    #[test]
    fn sign_out_when_signed_out_is_ok() {
        let (service, _) = service();
        assert!(!service.is_authenticated());
        service.sign_out().unwrap();
        assert!(service.current_profile().unwrap().is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ClientConfig::builder().scopes(Vec::new()).build();
        let result = AuthService::new(
            Arc::new(config),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryPendingStore::new()),
        );
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }
}
