use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use reqwest::Url;
use tracing::debug;

use super::error::AuthError;
use super::pending::PendingAuthorization;
use super::registry::{InstanceAppCredential, InstanceAppRegistry};
use crate::config::ClientConfig;

const AUTHORIZE_PATH: &str = "/oauth/authorize";

/// Builds the consent-screen URL for an instance.
///
/// The only I/O is the registry lookup, which registers the application with
/// the instance the first time that instance is seen.
pub struct AuthorizationUrlBuilder {
    registry: Arc<InstanceAppRegistry>,
}

impl AuthorizationUrlBuilder {
    pub fn new(registry: Arc<InstanceAppRegistry>) -> Self {
        Self { registry }
    }

    /// URL the user must visit to approve this application.
    ///
    /// `state` must be unguessable and unique per attempt; see
    /// [`generate_state`].
    pub async fn build_authorization_url(
        &self,
        instance_host: &str,
        state: &str,
    ) -> Result<Url, AuthError> {
        let (url, _) = self.begin(instance_host, state).await?;
        Ok(url)
    }

    /// Build the URL together with the pending record the callback will need.
    pub async fn begin(
        &self,
        instance_host: &str,
        state: &str,
    ) -> Result<(Url, PendingAuthorization), AuthError> {
        if state.is_empty() {
            return Err(AuthError::MissingParameters);
        }
        let app = self.registry.get_or_register(instance_host).await?;
        let url = authorization_url(self.registry.config(), &app, state)?;
        debug!(instance = %app.instance_host, "built authorization URL");
        Ok((url, PendingAuthorization::new(&app, state)))
    }
}

/// Pure URL construction from an app registration.
pub fn authorization_url(
    config: &ClientConfig,
    app: &InstanceAppCredential,
    state: &str,
) -> Result<Url, AuthError> {
    let mut url = config.instance_url(&app.instance_host, AUTHORIZE_PATH)?;
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("client_id", &app.client_id);
        params.append_pair("redirect_uri", &config.redirect_uri);
        params.append_pair("response_type", "code");
        params.append_pair("scope", &config.scope_string());
        params.append_pair("state", state);
        if config.force_login {
            params.append_pair("force_login", "true");
        }
    }
    Ok(url)
}

/// 256 random bits, URL-safe base64 without padding.
pub fn generate_state() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn app() -> InstanceAppCredential {
        InstanceAppCredential {
            instance_host: "social.example".to_string(),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
        }
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn url_carries_every_oauth_parameter() {
        let config = ClientConfig::default();
        let url = authorization_url(&config, &app(), "s-abc123").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("social.example"));
        assert_eq!(url.path(), "/oauth/authorize");

        let query = query(&url);
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["redirect_uri"], config.redirect_uri);
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["scope"], "read write follow");
        assert_eq!(query["state"], "s-abc123");
        assert_eq!(query["force_login"], "true");
        assert!(!url.as_str().contains("secret-1"));
    }

    #[test]
    fn force_login_can_be_disabled() {
        let config = ClientConfig::builder().force_login(false).build();
        let url = authorization_url(&config, &app(), "s").unwrap();
        assert!(!query(&url).contains_key("force_login"));
    }

    #[test]
    fn state_is_escaped_in_query() {
        let url = authorization_url(&ClientConfig::default(), &app(), "a b&c").unwrap();
        assert_eq!(query(&url)["state"], "a b&c");
    }

    #[test]
    fn generated_state_is_url_safe_and_unique() {
        let first = generate_state();
        let second = generate_state();
        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn empty_state_is_rejected_before_registration() {
        let registry = Arc::new(InstanceAppRegistry::with_client(
            reqwest::Client::new(),
            Arc::new(ClientConfig::default()),
        ));
        let builder = AuthorizationUrlBuilder::new(registry.clone());
        let err = builder
            .build_authorization_url("social.example", "")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingParameters));
        assert!(registry.is_empty());
    }
}
