//! Client configuration (layered: defaults < config file < env < code).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

pub const DEFAULT_CLIENT_NAME: &str = "fedauth";
pub const DEFAULT_WEBSITE: &str = "http://localhost:3000";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/api/auth/callback";
pub const DEFAULT_SCOPES: &[&str] = &["read", "write", "follow"];
pub const CONFIG_FILE_NAME: &str = "config.toml";

const ENV_PREFIX: &str = "FEDAUTH_";

/// How this client presents itself to instances and where it keeps state.
///
/// The redirect URI is fixed per deployment and passed in here; nothing in
/// the sign-in flow derives it from the process environment.
///
/// # Example
/// ```
/// use fedauth::config::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .client_name("Thamizhi".to_string())
///     .redirect_uri("https://app.example/api/auth/callback".to_string())
///     .build();
/// assert_eq!(config.scope_string(), "read write follow");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Application name shown on the instance's consent screen.
    #[builder(default = DEFAULT_CLIENT_NAME.to_string())]
    pub client_name: String,
    #[builder(default = DEFAULT_WEBSITE.to_string())]
    pub website: String,
    #[builder(default = DEFAULT_REDIRECT_URI.to_string())]
    pub redirect_uri: String,
    #[builder(default = default_scopes())]
    pub scopes: Vec<String>,
    /// Ask the instance to show its login form even with an active session.
    #[builder(default = true)]
    pub force_login: bool,
    #[builder(default = "https".to_string())]
    pub instance_scheme: String,
    #[builder(default = default_data_dir())]
    pub data_dir: PathBuf,
    #[builder(default = 600)]
    pub pending_ttl_secs: u64,
    #[builder(default = 30)]
    pub http_timeout_secs: u64,
    /// Base URLs used for server-to-server API calls, keyed by instance host.
    /// The browser-facing authorize URL always uses the instance host itself.
    #[builder(default)]
    pub api_base_overrides: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientConfig {
    /// Load `.env`, then layer the config file under the data dir and the
    /// `FEDAUTH_*` environment over the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_env_in(None)
    }

    /// Like [`ClientConfig::from_env`], but `data_dir` (when given) wins over
    /// `FEDAUTH_DATA_DIR` and decides which config file is read.
    pub fn from_env_in(data_dir: Option<PathBuf>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::layered(data_dir, |key: &str| std::env::var(key).ok())
    }

    /// Resolve the data dir, read `config.toml` from it, then overlay the
    /// variables resolved through `lookup`.
    pub fn layered(
        data_dir: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let data_dir = data_dir
            .or_else(|| lookup(&format!("{ENV_PREFIX}DATA_DIR")).map(PathBuf::from))
            .unwrap_or_else(default_data_dir);
        let mut config = Self::load_or_default(data_dir.join(CONFIG_FILE_NAME))?;
        config.apply_env(&lookup)?;
        config.data_dir = data_dir;
        Ok(config)
    }

    /// Read a TOML config file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AuthError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|err| {
            AuthError::Configuration(format!("invalid config {}: {err}", path.display()))
        })
    }

    /// Like [`ClientConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay `FEDAUTH_*` variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("CLIENT_NAME") {
            self.client_name = value;
        }
        if let Some(value) = var("WEBSITE") {
            self.website = value;
        }
        if let Some(value) = var("REDIRECT_URI") {
            self.redirect_uri = value;
        }
        if let Some(value) = var("SCOPES") {
            self.scopes = value
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = var("FORCE_LOGIN") {
            self.force_login = parse_bool("FORCE_LOGIN", &value)?;
        }
        if let Some(value) = var("INSTANCE_SCHEME") {
            self.instance_scheme = value;
        }
        if let Some(value) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = var("PENDING_TTL_SECS") {
            self.pending_ttl_secs = parse_u64("PENDING_TTL_SECS", &value)?;
        }
        if let Some(value) = var("HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_u64("HTTP_TIMEOUT_SECS", &value)?;
        }
        Ok(())
    }

    /// Reject configurations that would produce unusable requests.
    pub fn validate(&self) -> Result<()> {
        if self.client_name.trim().is_empty() {
            return Err(AuthError::Configuration("client_name is empty".to_string()));
        }
        if self.scopes.is_empty() {
            return Err(AuthError::Configuration("no scopes configured".to_string()));
        }
        Url::parse(&self.redirect_uri).map_err(|err| {
            AuthError::Configuration(format!("invalid redirect_uri: {err}"))
        })?;
        if !matches!(self.instance_scheme.as_str(), "https" | "http") {
            return Err(AuthError::Configuration(format!(
                "unsupported instance_scheme: {}",
                self.instance_scheme
            )));
        }
        for (host, base) in &self.api_base_overrides {
            Url::parse(base).map_err(|err| {
                AuthError::Configuration(format!("invalid API base for {host}: {err}"))
            })?;
        }
        Ok(())
    }

    /// Scopes as the space-separated string instances expect.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    /// Browser-facing URL on the instance (the consent screen).
    pub fn instance_url(&self, host: &str, path: &str) -> Result<Url> {
        join_url(&format!("{}://{host}", self.instance_scheme), path)
    }

    /// Server-to-server API URL on the instance, honoring overrides.
    pub fn api_url(&self, host: &str, path: &str) -> Result<Url> {
        match self.api_base_overrides.get(host) {
            Some(base) => join_url(base, path),
            None => self.instance_url(host, path),
        }
    }

    /// HTTP client with the configured timeout.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .user_agent(format!("{}/{}", self.client_name, env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AuthError::Configuration(format!("HTTP client: {err}")))
    }
}

fn join_url(base: &str, path: &str) -> Result<Url> {
    let raw = format!("{}{path}", base.trim_end_matches('/'));
    Url::parse(&raw).map_err(|err| AuthError::InvalidInstance(format!("{raw}: {err}")))
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_data_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".fedauth"))
        .unwrap_or_else(|| PathBuf::from(".fedauth"))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AuthError::Configuration(format!(
            "{ENV_PREFIX}{name}: expected a boolean, got {other:?}"
        ))),
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| {
        AuthError::Configuration(format!(
            "{ENV_PREFIX}{name}: expected a number, got {value:?}"
        ))
    })
}
