use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Access token issued by an instance, plus the instance it is valid for.
///
/// Tokens are opaque and replaced wholesale on re-authorization. `Debug`
/// output redacts the token.
///
/// # Example
/// ```
/// use fedauth::auth::Credential;
///
/// let credential = Credential::new("tok-1", "social.example");
/// assert!(!format!("{credential:?}").contains("tok-1"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub instance_host: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, instance_host: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            instance_host: instance_host.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("instance_host", &self.instance_host)
            .finish()
    }
}

/// Cached account details of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: String,
    pub bio: String,
    pub url: String,
    pub follower_count: u64,
    pub following_count: u64,
    pub post_count: u64,
    pub last_post_at: Option<DateTime<Utc>>,
    pub custom_fields: Vec<ProfileField>,
}

/// Name/value metadata pair shown on a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileField {
    pub name: String,
    pub value: String,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Account payload of `GET /api/v1/accounts/verify_credentials`.
#[derive(Debug, Deserialize)]
pub(crate) struct AccountResponse {
    id: String,
    username: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    following_count: u64,
    #[serde(default)]
    statuses_count: u64,
    #[serde(default)]
    last_status_at: Option<String>,
    #[serde(default)]
    fields: Option<Vec<FieldResponse>>,
}

#[derive(Debug, Deserialize)]
struct FieldResponse {
    name: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    verified_at: Option<String>,
}

impl From<AccountResponse> for Profile {
    fn from(account: AccountResponse) -> Self {
        let display_name = account
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| account.username.clone());
        Self {
            id: account.id,
            handle: account.username,
            display_name,
            avatar_url: account.avatar.unwrap_or_default(),
            bio: account.note.unwrap_or_default(),
            url: account.url.unwrap_or_default(),
            follower_count: account.followers_count,
            following_count: account.following_count,
            post_count: account.statuses_count,
            last_post_at: account.last_status_at.as_deref().and_then(parse_timestamp),
            custom_fields: account
                .fields
                .unwrap_or_default()
                .into_iter()
                .map(|field| ProfileField {
                    name: field.name,
                    value: field.value,
                    verified_at: field.verified_at.as_deref().and_then(parse_timestamp),
                })
                .collect(),
        }
    }
}

/// Instances send either RFC 3339 timestamps or bare dates (`2024-05-01`).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
