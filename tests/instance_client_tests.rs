mod auth_support;

use fedauth::auth::{Credential, CredentialStore};
use fedauth::error::AuthError;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_support::{account_json, harness, profile, HOST};

fn sign_in(h: &auth_support::Harness) {
    h.store
        .set_both(&Credential::new("tok-1", HOST), &profile("alice"))
        .unwrap();
}

#[tokio::test]
async fn favourite_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses/110/favourite"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "110",
            "content": "<p>hi</p>",
            "favourited": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    sign_in(&h);
    let status = h.service.instance_client().favourite("110").await.unwrap();
    assert_eq!(status.id, "110");
    assert_eq!(status.favourited, Some(true));
}

#[tokio::test]
async fn reblog_returns_the_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses/110/reblog"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "111",
            "reblogged": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    sign_in(&h);
    let status = h.service.instance_client().reblog("110").await.unwrap();
    assert_eq!(status.reblogged, Some(true));
}

#[tokio::test]
async fn reply_posts_in_reply_to() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .and(body_json(json!({"status": "@bob nice", "in_reply_to_id": "110"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "112",
            "in_reply_to_id": "110"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    sign_in(&h);
    let status = h
        .service
        .instance_client()
        .reply("110", "@bob nice")
        .await
        .unwrap();
    assert_eq!(status.in_reply_to_id.as_deref(), Some("110"));
}

#[tokio::test]
async fn unauthorized_call_revalidates_and_evicts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses/110/favourite"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/verify_credentials"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    sign_in(&h);
    let err = h
        .service
        .instance_client()
        .favourite("110")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ValidationFailed(_)));
    assert!(!h.service.is_authenticated());
    assert!(h.service.current_profile().unwrap().is_none());
}

#[tokio::test]
async fn unauthorized_call_keeps_session_that_still_verifies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses/110/favourite"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "This action is not allowed"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/verify_credentials"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(account_json("alice")))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    sign_in(&h);
    let err = h
        .service
        .instance_client()
        .favourite("110")
        .await
        .unwrap_err();
    assert!(
        matches!(&err, AuthError::Api { status: 401, body } if body.contains("not allowed")),
        "{err:?}"
    );
    assert!(h.service.is_authenticated());
    assert_eq!(
        h.service.current_credential().unwrap(),
        Some(Credential::new("tok-1", HOST))
    );
    assert_eq!(
        h.service.current_profile().unwrap().map(|p| p.handle),
        Some("alice".to_string())
    );
}

#[tokio::test]
async fn other_failures_are_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses/110/reblog"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Record not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    sign_in(&h);
    let err = h.service.instance_client().reblog("110").await.unwrap_err();
    assert!(matches!(&err, AuthError::Api { status: 404, body } if body.contains("Record not found")));
    assert!(h.service.is_authenticated());
}

#[tokio::test]
async fn signed_out_client_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server);
    let err = h
        .service
        .instance_client()
        .favourite("110")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotSignedIn));
}
