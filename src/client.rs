//! Authenticated calls against the signed-in user's instance.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{Credential, CredentialStore, SessionValidator, ValidationResult};
use crate::config::ClientConfig;
use crate::error::{AuthError, Result};

/// The subset of a status the client reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub favourited: Option<bool>,
    #[serde(default)]
    pub reblogged: Option<bool>,
}

#[derive(Serialize)]
struct NewStatus<'a> {
    status: &'a str,
    in_reply_to_id: &'a str,
}

/// Acts on statuses with the stored credential.
///
/// A `401` from the instance triggers a revalidation of the session. If the
/// instance rejects the token there too, the session is evicted and the call
/// fails with `ValidationFailed`. If the token still verifies, the session is
/// kept and the `401` is returned as an `Api` error.
pub struct InstanceClient {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    store: Arc<dyn CredentialStore>,
    validator: SessionValidator,
}

impl InstanceClient {
    pub fn new(
        client: reqwest::Client,
        config: Arc<ClientConfig>,
        store: Arc<dyn CredentialStore>,
        validator: SessionValidator,
    ) -> Self {
        Self {
            client,
            config,
            store,
            validator,
        }
    }

    pub async fn favourite(&self, status_id: &str) -> Result<Status> {
        let path = format!("/api/v1/statuses/{}/favourite", check_status_id(status_id)?);
        self.send(Method::POST, &path, None::<&()>).await
    }

    pub async fn reblog(&self, status_id: &str) -> Result<Status> {
        let path = format!("/api/v1/statuses/{}/reblog", check_status_id(status_id)?);
        self.send(Method::POST, &path, None::<&()>).await
    }

    /// Post `text` as a reply to `status_id`.
    pub async fn reply(&self, status_id: &str, text: &str) -> Result<Status> {
        if text.trim().is_empty() {
            return Err(AuthError::MissingParameters);
        }
        check_status_id(status_id)?;
        let body = NewStatus {
            status: text,
            in_reply_to_id: status_id,
        };
        self.send(Method::POST, "/api/v1/statuses", Some(&body))
            .await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Status> {
        let credential = self.credential()?;
        let url = self.config.api_url(&credential.instance_host, path)?;

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&credential.access_token)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await?;

        let status = resp.status();
        let text = resp.text().await?;
        if status == StatusCode::UNAUTHORIZED {
            warn!(instance = %credential.instance_host, path, "instance rejected token");
            return Err(match self.validator.validate().await? {
                ValidationResult::Invalid => {
                    AuthError::ValidationFailed(format!("{path} returned HTTP 401"))
                }
                ValidationResult::Valid(_) => AuthError::api(status.as_u16(), &text),
                ValidationResult::NoCredential => AuthError::NotSignedIn,
            });
        }
        if !status.is_success() {
            return Err(AuthError::api(status.as_u16(), &text));
        }
        debug!(instance = %credential.instance_host, path, "instance call succeeded");
        serde_json::from_str(&text).map_err(|err| {
            AuthError::api(status.as_u16(), &format!("unparsable status: {err}"))
        })
    }

    fn credential(&self) -> Result<Credential> {
        self.store.get_credential()?.ok_or(AuthError::NotSignedIn)
    }
}

/// Status ids are opaque but must stay a single path segment.
fn check_status_id(status_id: &str) -> Result<&str> {
    if status_id.is_empty()
        || !status_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AuthError::MissingParameters);
    }
    Ok(status_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ids_must_be_single_segments() {
        assert_eq!(check_status_id("109876").unwrap(), "109876");
        assert!(check_status_id("").is_err());
        assert!(check_status_id("../apps").is_err());
        assert!(check_status_id("1?x=2").is_err());
    }

    #[test]
    fn minimal_status_deserializes() {
        let status: Status = serde_json::from_str(r#"{"id":"1"}"#).unwrap();
        assert_eq!(status.id, "1");
        assert!(status.favourited.is_none());
    }
}
