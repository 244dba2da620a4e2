use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::AuthError;
use super::instance::normalize_instance_host;
use crate::config::ClientConfig;

const APPS_PATH: &str = "/api/v1/apps";

/// Client id/secret issued by one instance for this application.
///
/// `Debug` output redacts the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAppCredential {
    pub instance_host: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for InstanceAppCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceAppCredential")
            .field("instance_host", &self.instance_host)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Per-process cache of app registrations, one per instance host.
///
/// Registrations live only as long as the registry; after a restart the next
/// sign-in registers again. Two concurrent misses for the same host may both
/// register, and the last response wins the cache slot.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use fedauth::auth::InstanceAppRegistry;
/// use fedauth::config::ClientConfig;
///
/// # async fn run() -> fedauth::error::Result<()> {
/// let registry = InstanceAppRegistry::new(Arc::new(ClientConfig::default()))?;
/// let app = registry.get_or_register("mastodon.social").await?;
/// println!("client id: {}", app.client_id);
/// # Ok(())
/// # }
/// ```
pub struct InstanceAppRegistry {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    apps: RwLock<HashMap<String, InstanceAppCredential>>,
}

impl InstanceAppRegistry {
    pub fn new(config: Arc<ClientConfig>) -> Result<Self, AuthError> {
        let client = config.http_client()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: Arc<ClientConfig>) -> Self {
        Self {
            client,
            config,
            apps: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    /// Return the cached registration for `instance_host`, registering the
    /// application with the instance on a miss.
    pub async fn get_or_register(
        &self,
        instance_host: &str,
    ) -> Result<InstanceAppCredential, AuthError> {
        let host = normalize_instance_host(instance_host)?;
        if let Some(app) = self.cached(&host) {
            debug!(instance = %host, "using cached app registration");
            return Ok(app);
        }
        let app = self.register(&host).await?;
        self.insert(app.clone());
        Ok(app)
    }

    /// Cached registration for an already normalized host.
    pub fn cached(&self, instance_host: &str) -> Option<InstanceAppCredential> {
        self.apps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(instance_host)
            .cloned()
    }

    /// Seed the cache with a registration obtained elsewhere.
    pub fn insert(&self, app: InstanceAppCredential) {
        self.apps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(app.instance_host.clone(), app);
    }

    /// Drop a cached registration so the next sign-in registers again.
    pub fn forget(&self, instance_host: &str) -> bool {
        self.apps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(instance_host)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.apps.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn register(&self, host: &str) -> Result<InstanceAppCredential, AuthError> {
        let url = self.config.api_url(host, APPS_PATH)?;
        let scopes = self.config.scope_string();
        let request = AppRegistrationRequest {
            client_name: &self.config.client_name,
            redirect_uris: &self.config.redirect_uri,
            scopes: &scopes,
            website: &self.config.website,
        };

        let resp = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| AuthError::registration(host, None, &err.without_url().to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| AuthError::registration(host, Some(status.as_u16()), &err.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::registration(host, Some(status.as_u16()), &body));
        }
        let payload: AppRegistrationResponse = serde_json::from_str(&body).map_err(|err| {
            AuthError::registration(
                host,
                Some(status.as_u16()),
                &format!("unparsable registration response: {err}"),
            )
        })?;

        info!(instance = %host, client_id = %payload.client_id, "registered application");
        Ok(InstanceAppCredential {
            instance_host: host.to_string(),
            client_id: payload.client_id,
            client_secret: payload.client_secret,
        })
    }
}

#[derive(Debug, Serialize)]
struct AppRegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: &'a str,
    scopes: &'a str,
    website: &'a str,
}

#[derive(Debug, Deserialize)]
struct AppRegistrationResponse {
    client_id: String,
    client_secret: String,
}
