use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::credential::Credential;
use super::error::AuthError;
use super::pending::{PendingAuthorization, PendingStore};
use super::store::CredentialStore;
use crate::config::ClientConfig;

const TOKEN_PATH: &str = "/oauth/token";

/// `code` and `state` as they arrived on the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

impl CallbackParams {
    /// Parse a pasted redirect URL or bare query string.
    ///
    /// An `error` parameter (the user declined on the instance) yields
    /// [`AuthError::AccessDenied`].
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let raw = raw.trim();
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(_) => {
                let query = raw.trim_start_matches('?');
                Url::parse(&format!("http://callback.invalid/?{query}"))
                    .map_err(|_| AuthError::MissingParameters)?
            }
        };

        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => return Err(AuthError::AccessDenied),
                _ => {}
            }
        }
        Ok(params)
    }
}

/// Extract `code` and `state` from a redirect URL the user pasted back.
pub fn parse_callback_url(raw: &str) -> Result<CallbackParams, AuthError> {
    CallbackParams::parse(raw)
}

/// Finishes a sign-in: checks the callback against the pending record,
/// exchanges the code for a token and stores the resulting credential.
///
/// This is the only path that creates a [`Credential`].
pub struct CallbackExchanger {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    store: Arc<dyn CredentialStore>,
    pending: Arc<dyn PendingStore>,
}

impl CallbackExchanger {
    pub fn new(
        client: reqwest::Client,
        config: Arc<ClientConfig>,
        store: Arc<dyn CredentialStore>,
        pending: Arc<dyn PendingStore>,
    ) -> Self {
        Self {
            client,
            config,
            store,
            pending,
        }
    }

    /// Consume the pending record for `session_key`, then complete the login.
    ///
    /// The record is taken before any check runs, so it is gone whether the
    /// callback succeeds or not; a replayed callback finds nothing. Missing
    /// parameters are still reported ahead of a failure to read the record.
    pub async fn complete_from_store(
        &self,
        session_key: &str,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<Credential, AuthError> {
        let taken = self.pending.take(session_key);
        if non_empty(code).is_none() || non_empty(state).is_none() {
            return Err(AuthError::MissingParameters);
        }
        self.complete_login(code, state, taken?).await
    }

    /// Validate the callback against `pending` and exchange the code.
    ///
    /// Checks run in order and the first failure wins: both parameters
    /// present, a pending record exists, the state matches. No token request
    /// is made unless all three pass.
    pub async fn complete_login(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        pending: Option<PendingAuthorization>,
    ) -> Result<Credential, AuthError> {
        let (code, state) = match (non_empty(code), non_empty(state)) {
            (Some(code), Some(state)) => (code, state),
            _ => return Err(AuthError::MissingParameters),
        };
        let pending = pending.ok_or(AuthError::NoPendingAuthorization)?;
        if !bool::from(state.as_bytes().ct_eq(pending.state.as_bytes())) {
            warn!(instance = %pending.instance_host, "callback state mismatch");
            return Err(AuthError::StateMismatch);
        }

        let access_token = self.exchange_code(&pending, code).await?;
        let credential = Credential::new(access_token, pending.instance_host);
        self.store.set_credential(&credential)?;
        info!(instance = %credential.instance_host, "sign-in completed");
        Ok(credential)
    }

    async fn exchange_code(
        &self,
        pending: &PendingAuthorization,
        code: &str,
    ) -> Result<String, AuthError> {
        let url = self.config.api_url(&pending.instance_host, TOKEN_PATH)?;
        let scope = self.config.scope_string();
        let request = TokenRequest {
            client_id: &pending.client_id,
            client_secret: &pending.client_secret,
            redirect_uri: &self.config.redirect_uri,
            grant_type: "authorization_code",
            code,
            scope: &scope,
        };

        let resp = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| AuthError::token_exchange(None, &err.without_url().to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| AuthError::token_exchange(Some(status.as_u16()), &err.to_string()))?;
        if !status.is_success() {
            warn!(
                instance = %pending.instance_host,
                status = status.as_u16(),
                "token exchange rejected"
            );
            return Err(AuthError::token_exchange(Some(status.as_u16()), &body));
        }

        let payload: TokenResponse = serde_json::from_str(&body).map_err(|err| {
            AuthError::token_exchange(
                Some(status.as_u16()),
                &format!("unparsable token response: {err}"),
            )
        })?;
        if payload.access_token.is_empty() {
            return Err(AuthError::token_exchange(
                Some(status.as_u16()),
                "token response has an empty access_token",
            ));
        }
        Ok(payload.access_token)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
    code: &'a str,
    scope: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}
