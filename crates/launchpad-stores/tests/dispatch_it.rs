use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use launchpad_auth::{AuthCredentials, AuthManager, CredentialType, ManualClock};
use launchpad_stores::{
    AdapterRegistry, DispatchSettings, ErrorCode, Operation, ReleaseRef, ReleaseStatus,
    RetryPolicy, StoreKind, Support, UploadRequest,
};

const RSA_PRIVATE: &str = include_str!("../../launchpad-auth/tests/fixtures/rsa_private.pem");

const START_MS: i64 = 1_700_000_000_000;

fn auth() -> Arc<AuthManager> {
    Arc::new(AuthManager::new().with_clock(Arc::new(ManualClock::new(START_MS))))
}

/// Every backend pointed at the mock server, retrying quickly
fn registry(auth: Arc<AuthManager>, server: &MockServer, retry: RetryPolicy) -> AdapterRegistry {
    let base_urls: HashMap<String, String> = StoreKind::ALL
        .iter()
        .map(|kind| (kind.id().to_string(), server.base_url()))
        .collect();
    let settings = DispatchSettings {
        retry,
        base_urls,
        ..Default::default()
    };
    AdapterRegistry::create_with(auth, &settings)
}

fn service_account(server: &MockServer) -> AuthCredentials {
    AuthCredentials::new(CredentialType::OAuth2)
        .with("client_email", "publisher@project.iam.gserviceaccount.com")
        .with("private_key", RSA_PRIVATE)
        .with("token_uri", server.url("/token"))
}

async fn token_mock(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"ya29.tok","expires_in":3600,"token_type":"Bearer"}"#);
        })
        .await
}

#[tokio::test]
async fn registry_lists_capabilities_without_credentials() {
    let registry = AdapterRegistry::create_default(Arc::new(AuthManager::new()));

    assert!(registry.get_adapter("unregistered").is_none());
    assert_eq!(registry.get_all_capabilities().len(), StoreKind::ALL.len());

    let vivo = registry.get_capabilities("vivo").unwrap();
    assert!(vivo.requires_icp);
    assert!(vivo.supports(Operation::UploadBuild));
    assert!(!vivo.supports(Operation::Rollback));
}

#[tokio::test]
async fn unsupported_operations_never_touch_the_network() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(500);
        })
        .await;
    let registry = registry(auth(), &server, RetryPolicy::default());

    let apple = registry.get_adapter("apple").unwrap();
    let request = UploadRequest {
        app_id: "123456789".to_string(),
        artifact: "build/App.ipa".into(),
        ..Default::default()
    };
    let result = apple.upload_build(&request).await.unwrap();

    match &result {
        Support::Unsupported(info) => {
            assert!(!info.success);
            assert_eq!(info.store_id, "apple");
            assert_eq!(info.operation, Operation::UploadBuild);
        }
        Support::Supported(_) => panic!("App Store Connect should not accept uploads"),
    }
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], false);

    let xiaomi = registry.get_adapter("xiaomi").unwrap();
    let rollback = xiaomi.rollback(&ReleaseRef::new("com.example.app")).await.unwrap();
    assert!(!rollback.is_supported());

    mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn api_key_backend_sends_key_header() {
    let server = MockServer::start_async().await;
    let app_id = "1:1234567890:android:321abc";
    let releases = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/v1/projects/1234567890/apps/{}/releases", app_id))
                .query_param("pageSize", "1")
                .header("x-goog-api-key", "AIza-test");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"releases":[{"name":"projects/1234567890/apps/1:1234567890:android:321abc/releases/r1","displayVersion":"1.4.0"}]}"#,
                );
        })
        .await;

    let auth = auth();
    auth.set_credentials("firebase", AuthCredentials::api_key("AIza-test"));
    let registry = registry(auth, &server, RetryPolicy::default());

    let firebase = registry.get_adapter("firebase").unwrap();
    firebase.authenticate().await.unwrap();
    let report = firebase
        .get_status(&ReleaseRef::new(app_id))
        .await
        .unwrap()
        .supported()
        .unwrap();

    assert_eq!(report.status, ReleaseStatus::Live);
    assert_eq!(report.detail.as_deref(), Some("1.4.0"));
    releases.assert_calls_async(1).await;
}

#[tokio::test]
async fn service_account_token_is_reused_across_calls() {
    let server = MockServer::start_async().await;
    let token = token_mock(&server).await;
    let edits = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/androidpublisher/v3/applications/com.example.app/edits")
                .header("authorization", "Bearer ya29.tok");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"id":"edit-1"}"#);
        })
        .await;
    let track = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/androidpublisher/v3/applications/com.example.app/edits/edit-1/tracks/production");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"track":"production","releases":[{"status":"inProgress","userFraction":0.1,"versionCodes":["42"]}]}"#,
                );
        })
        .await;

    let auth = auth();
    auth.set_credentials("google-play", service_account(&server));
    let registry = registry(auth, &server, RetryPolicy::default());
    let play = registry.get_adapter("google-play").unwrap();

    for _ in 0..2 {
        let report = play
            .get_status(&ReleaseRef::new("com.example.app"))
            .await
            .unwrap()
            .supported()
            .unwrap();
        assert_eq!(report.status, ReleaseStatus::InProgress);
        assert_eq!(report.rollout_fraction, Some(0.1));
        assert_eq!(report.release_id.as_deref(), Some("42"));
    }

    token.assert_calls_async(1).await;
    edits.assert_calls_async(2).await;
    track.assert_calls_async(2).await;
}

#[tokio::test]
async fn rejected_token_is_fatal_and_invalidated() {
    let server = MockServer::start_async().await;
    let token = token_mock(&server).await;
    let edits = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/androidpublisher/v3/applications/com.example.app/edits");
            then.status(401)
                .header("content-type", "application/json")
                .body(r#"{"error":{"code":401,"message":"Request had invalid authentication credentials."}}"#);
        })
        .await;

    let auth = auth();
    auth.set_credentials("google-play", service_account(&server));
    let registry = registry(auth.clone(), &server, RetryPolicy::new(3, Duration::from_millis(1)));
    let play = registry.get_adapter("google-play").unwrap();

    let err = play
        .get_status(&ReleaseRef::new("com.example.app"))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::AuthenticationFailed);
    assert_eq!(err.status_code, Some(401));
    assert_eq!(err.backend_id.as_deref(), Some("google-play"));
    assert!(!err.retryable);
    assert!(!auth.is_token_valid("google-play"));
    token.assert_calls_async(1).await;
    edits.assert_calls_async(1).await;
}

#[tokio::test]
async fn transient_failures_are_retried_until_exhausted() {
    let server = MockServer::start_async().await;
    token_mock(&server).await;
    let edits = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/androidpublisher/v3/applications/com.example.app/edits");
            then.status(503).body("Service Unavailable");
        })
        .await;

    let auth = auth();
    auth.set_credentials("google-play", service_account(&server));
    let registry = registry(auth, &server, RetryPolicy::new(2, Duration::from_millis(1)));
    let play = registry.get_adapter("google-play").unwrap();

    let err = play
        .get_status(&ReleaseRef::new("com.example.app"))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::BackendUnavailable);
    assert!(err.message.contains("after 3 attempts"), "{}", err.message);
    edits.assert_calls_async(3).await;
}

#[tokio::test]
async fn hmac_backend_signs_router_parameters() {
    let server = MockServer::start_async().await;
    let router = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/router/rest")
                .form_urlencoded_tuple("method", "app.query.details")
                .form_urlencoded_tuple("packageName", "com.example.app")
                .form_urlencoded_tuple("access_key", "ak-1")
                .form_urlencoded_tuple("sign_method", "hmac")
                .form_urlencoded_tuple("timestamp", START_MS.to_string());
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"code":0,"msg":"success","data":{"status":3,"versionCode":"42"}}"#);
        })
        .await;

    let auth = auth();
    auth.set_credentials(
        "vivo",
        AuthCredentials::hmac("vivo-secret").with("access_key", "ak-1"),
    );
    let registry = registry(auth, &server, RetryPolicy::default());
    let vivo = registry.get_adapter("vivo").unwrap();

    let report = vivo
        .get_status(&ReleaseRef::new("com.example.app"))
        .await
        .unwrap()
        .supported()
        .unwrap();

    assert_eq!(report.status, ReleaseStatus::Live);
    assert_eq!(report.release_id.as_deref(), Some("42"));
    router.assert_calls_async(1).await;
}

#[tokio::test]
async fn backend_rejection_in_body_is_not_retried() {
    let server = MockServer::start_async().await;
    let router = server
        .mock_async(|when, then| {
            when.method(POST).path("/router/rest");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"code":10004,"msg":"sign error"}"#);
        })
        .await;

    let auth = auth();
    auth.set_credentials(
        "vivo",
        AuthCredentials::hmac("vivo-secret").with("access_key", "ak-1"),
    );
    let registry = registry(auth, &server, RetryPolicy::new(3, Duration::from_millis(1)));
    let vivo = registry.get_adapter("vivo").unwrap();

    let err = vivo
        .get_status(&ReleaseRef::new("com.example.app"))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::ValidationFailed);
    assert!(err.message.contains("sign error"));
    router.assert_calls_async(1).await;
}

#[tokio::test]
async fn rsa_backend_sends_signed_request_data() {
    let server = MockServer::start_async().await;
    let query = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/dev/query")
                .form_urlencoded_tuple("timestamp", START_MS.to_string());
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"result":0,"packageInfo":{"versionCode":120,"versionName":"1.2.0"}}"#);
        })
        .await;

    let auth = auth();
    auth.set_credentials(
        "xiaomi",
        AuthCredentials::rsa(RSA_PRIVATE).with("user_name", "dev@example.com"),
    );
    let registry = registry(auth, &server, RetryPolicy::default());
    let xiaomi = registry.get_adapter("xiaomi").unwrap();

    xiaomi.authenticate().await.unwrap();
    let report = xiaomi
        .get_status(&ReleaseRef::new("com.example.app"))
        .await
        .unwrap()
        .supported()
        .unwrap();

    assert_eq!(report.status, ReleaseStatus::Live);
    assert_eq!(report.release_id.as_deref(), Some("120"));
    assert_eq!(report.detail.as_deref(), Some("1.2.0"));
    query.assert_calls_async(1).await;
}

#[tokio::test]
async fn missing_account_field_fails_without_network() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(200).body("{}");
        })
        .await;

    let auth = auth();
    auth.set_credentials("xiaomi", AuthCredentials::rsa(RSA_PRIVATE));
    let registry = registry(auth, &server, RetryPolicy::new(3, Duration::from_millis(1)));
    let xiaomi = registry.get_adapter("xiaomi").unwrap();

    let err = xiaomi
        .get_status(&ReleaseRef::new("com.example.app"))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::InvalidCredentials);
    assert!(!err.retryable);
    mock.assert_calls_async(0).await;
}
