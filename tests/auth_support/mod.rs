#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use fedauth::auth::{
    AuthService, InstanceAppCredential, MemoryCredentialStore, MemoryPendingStore, Profile,
};
use fedauth::config::ClientConfig;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const HOST: &str = "social.example";
pub const REDIRECT_URI: &str = "http://localhost:3000/api/auth/callback";

/// Config whose API calls for `HOST` go to the mock server, while the
/// browser-facing authorize URL keeps the real host.
pub fn config_for(server: &MockServer) -> ClientConfig {
    let mut overrides = BTreeMap::new();
    overrides.insert(HOST.to_string(), server.uri());
    ClientConfig::builder()
        .client_name("Thamizhi".to_string())
        .redirect_uri(REDIRECT_URI.to_string())
        .api_base_overrides(overrides)
        .build()
}

pub struct Harness {
    pub service: AuthService,
    pub store: Arc<MemoryCredentialStore>,
    pub pending: Arc<MemoryPendingStore>,
}

pub fn harness(server: &MockServer) -> Harness {
    let store = Arc::new(MemoryCredentialStore::new());
    let pending = Arc::new(MemoryPendingStore::new());
    let service = AuthService::new(
        Arc::new(config_for(server)),
        store.clone(),
        pending.clone(),
    )
    .expect("service");
    Harness {
        service,
        store,
        pending,
    }
}

pub fn app_credential() -> InstanceAppCredential {
    InstanceAppCredential {
        instance_host: HOST.to_string(),
        client_id: "client-1".to_string(),
        client_secret: "secret-1".to_string(),
    }
}

pub async fn mount_registration(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/apps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1",
            "name": "Thamizhi",
            "client_id": "client-1",
            "client_secret": "secret-1"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub async fn mount_token(server: &MockServer, access_token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "scope": "read write follow",
            "created_at": 1_700_000_000
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn account_json(username: &str) -> Value {
    json!({
        "id": "109",
        "username": username,
        "acct": username,
        "display_name": "",
        "avatar": format!("https://{HOST}/avatars/{username}.png"),
        "note": "",
        "url": format!("https://{HOST}/@{username}"),
        "followers_count": 3,
        "following_count": 5,
        "statuses_count": 8
    })
}

pub fn profile(handle: &str) -> Profile {
    Profile {
        id: "1".to_string(),
        handle: handle.to_string(),
        display_name: handle.to_string(),
        avatar_url: String::new(),
        bio: String::new(),
        url: String::new(),
        follower_count: 0,
        following_count: 0,
        post_count: 0,
        last_post_at: None,
        custom_fields: Vec::new(),
    }
}
