use onedrive_core::OAuthClient;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn authorize_url_includes_required_params() {
    let client = OAuthClient::with_base_url("https://auth.example", "client-id", "secret")
        .expect("client should build");
    let url = client
        .authorize_url("http://localhost/callback", "onedrive.readwrite")
        .expect("url should build");

    let query = url.query().unwrap_or_default();
    assert!(query.contains("response_type=code"));
    assert!(query.contains("client_id=client-id"));
    assert!(query.contains("redirect_uri=http%3A%2F%2Flocalhost%2Fcallback"));
    assert!(query.contains("scope=onedrive.readwrite"));
}

#[tokio::test]
async fn exchange_code_posts_form_data() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth20_token.srf"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .and(body_string_contains("client_id=client-id"))
        .and(body_string_contains("client_secret=secret"))
        .and(body_string_contains(
            "redirect_uri=http%3A%2F%2Flocalhost%2Fcallback",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "scope": "onedrive.readwrite"
        })))
        .mount(&server)
        .await;

    let client = OAuthClient::with_base_url(&server.uri(), "client-id", "secret").unwrap();
    let token = client
        .exchange_code("auth-code", "http://localhost/callback")
        .await
        .unwrap();

    assert_eq!(token.access_token, "token");
    assert_eq!(token.expires_in, Some(3600));
    assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
}

#[tokio::test]
async fn refresh_token_posts_refresh_grant() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth20_token.srf"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-token",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "new-refresh"
        })))
        .mount(&server)
        .await;

    let client = OAuthClient::with_base_url(&server.uri(), "client-id", "secret").unwrap();
    let token = client.refresh_token("old-refresh").await.unwrap();

    assert_eq!(token.access_token, "new-token");
    assert_eq!(token.refresh_token.as_deref(), Some("new-refresh"));
}

#[tokio::test]
async fn oauth_error_carries_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth20_token.srf"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let client = OAuthClient::with_base_url(&server.uri(), "client-id", "secret").unwrap();
    let err = client
        .refresh_token("stale")
        .await
        .expect_err("expected oauth failure");

    match err {
        onedrive_core::OAuthError::Api { status, body } => {
            assert_eq!(status.as_u16(), 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
