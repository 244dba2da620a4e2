use std::sync::Arc;

use tracing::{debug, warn};

use super::credential::{AccountResponse, Credential, Profile};
use super::error::AuthError;
use super::store::CredentialStore;
use crate::config::ClientConfig;

const VERIFY_CREDENTIALS_PATH: &str = "/api/v1/accounts/verify_credentials";

/// Outcome of checking the stored credential against its instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The instance accepted the token; the profile has been refreshed.
    Valid(Profile),
    /// The token was rejected or the instance was unusable. Local state is gone.
    Invalid,
    /// Nothing stored, nothing checked.
    NoCredential,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Confirms the stored token with the instance, refreshing the profile on
/// success and evicting the credential on any failure.
#[derive(Clone)]
pub struct SessionValidator {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    store: Arc<dyn CredentialStore>,
}

impl SessionValidator {
    pub fn new(
        client: reqwest::Client,
        config: Arc<ClientConfig>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            client,
            config,
            store,
        }
    }

    /// Check the stored credential.
    ///
    /// Only storage failures are returned as errors. Any remote problem
    /// (rejected token, unreachable instance, malformed account) clears the
    /// credential and profile and yields [`ValidationResult::Invalid`].
    pub async fn validate(&self) -> Result<ValidationResult, AuthError> {
        Ok(match self.check().await? {
            None => ValidationResult::NoCredential,
            Some(Ok(profile)) => ValidationResult::Valid(profile),
            Some(Err(_)) => ValidationResult::Invalid,
        })
    }

    /// Like [`SessionValidator::validate`], but a rejected session becomes
    /// `ValidationFailed` and a missing one `NotSignedIn`.
    pub async fn validate_strict(&self) -> Result<Profile, AuthError> {
        match self.check().await? {
            None => Err(AuthError::NotSignedIn),
            Some(Ok(profile)) => Ok(profile),
            Some(Err(reason)) => Err(AuthError::ValidationFailed(reason)),
        }
    }

    /// Writes back only while the stored credential is still the one that
    /// was checked. If a sign-in or sign-out replaced it mid-request, the
    /// current state is checked instead.
    async fn check(&self) -> Result<Option<Result<Profile, String>>, AuthError> {
        loop {
            let Some(credential) = self.store.get_credential()? else {
                return Ok(None);
            };

            match self.fetch_profile(&credential).await {
                Ok(profile) => {
                    if self.store.refresh_profile(&credential, &profile)? {
                        debug!(instance = %credential.instance_host, handle = %profile.handle, "session valid");
                        return Ok(Some(Ok(profile)));
                    }
                }
                Err(reason) => {
                    if self.store.clear_if_current(&credential)? {
                        warn!(
                            instance = %credential.instance_host,
                            reason = %reason,
                            "session rejected; clearing stored credential"
                        );
                        return Ok(Some(Err(reason)));
                    }
                }
            }
            debug!(instance = %credential.instance_host, "stored credential changed during validation");
        }
    }

    /// Failure reasons never include the token.
    async fn fetch_profile(&self, credential: &Credential) -> Result<Profile, String> {
        let url = self
            .config
            .api_url(&credential.instance_host, VERIFY_CREDENTIALS_PATH)
            .map_err(|err| err.to_string())?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(&credential.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| format!("request failed: {}", err.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(format!("instance returned HTTP {}", status.as_u16()));
        }
        let account: AccountResponse = resp
            .json()
            .await
            .map_err(|err| format!("unparsable account: {}", err.without_url()))?;
        Ok(account.into())
    }
}
