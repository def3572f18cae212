use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use httpmock::prelude::*;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use launchpad_auth::signing::{
    service_account_assertion, ApiTokenClaims, AssertionClaims, APP_STORE_AUDIENCE,
};
use launchpad_auth::{AuthCredentials, AuthError, AuthManager, CredentialType, ManualClock};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::Sha256;
use tempfile::TempDir;

const EC_PRIVATE: &str = include_str!("fixtures/ec_private.pem");
const EC_PUBLIC: &str = include_str!("fixtures/ec_public.pem");
const RSA_PRIVATE: &str = include_str!("fixtures/rsa_private.pem");
const RSA_PUBLIC: &str = include_str!("fixtures/rsa_public.pem");
const RSA_SIG_A1_B2: &str = include_str!("fixtures/rsa_sig_a1_b2.txt");

const START_MS: i64 = 1_700_000_000_000;

fn manager() -> (AuthManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START_MS));
    (AuthManager::new().with_clock(clock.clone()), clock)
}

fn service_account(server: &MockServer) -> AuthCredentials {
    AuthCredentials::new(CredentialType::OAuth2)
        .with("client_email", "publisher@project.iam.gserviceaccount.com")
        .with("private_key", RSA_PRIVATE)
        .with("token_uri", server.url("/token"))
}

#[tokio::test]
async fn api_key_token_needs_no_network() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(500);
        })
        .await;
    let (auth, _clock) = manager();
    auth.set_credentials("a", AuthCredentials::api_key("k1"));

    assert_eq!(auth.get_token("a").await.unwrap(), "k1");

    mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn service_account_token_is_cached_for_its_lifetime() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/token")
                .form_urlencoded_tuple("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"tok","expires_in":3600,"token_type":"Bearer"}"#);
        })
        .await;
    let (auth, clock) = manager();
    auth.set_credentials("b", service_account(&server));

    assert_eq!(auth.get_token("b").await.unwrap(), "tok");
    assert!(auth.is_token_valid("b"));

    // Second call within the validity window is a cache hit
    assert_eq!(auth.get_token("b").await.unwrap(), "tok");
    mock.assert_calls_async(1).await;

    // Valid until expires_at - 60s
    clock.advance_ms(3_539_000);
    assert!(auth.is_token_valid("b"));
    clock.advance_ms(1_000);
    assert!(!auth.is_token_valid("b"));

    // Stale token triggers exactly one more exchange
    assert_eq!(auth.get_token("b").await.unwrap(), "tok");
    mock.assert_calls_async(2).await;
}

#[test]
fn service_account_assertion_carries_expected_claims() {
    let token_uri = "https://oauth2.example.com/token";
    let assertion = service_account_assertion(
        "b",
        "publisher@project.iam.gserviceaccount.com",
        RSA_PRIVATE,
        "https://www.googleapis.com/auth/androidpublisher",
        token_uri,
        START_MS / 1000,
    )
    .unwrap();

    let header = decode_header(&assertion).unwrap();
    assert_eq!(header.alg, Algorithm::RS256);

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[token_uri]);
    validation.validate_exp = false;
    let claims = decode::<AssertionClaims>(
        &assertion,
        &DecodingKey::from_rsa_pem(RSA_PUBLIC.as_bytes()).unwrap(),
        &validation,
    )
    .unwrap()
    .claims;

    assert_eq!(claims.iss, "publisher@project.iam.gserviceaccount.com");
    assert_eq!(claims.scope, "https://www.googleapis.com/auth/androidpublisher");
    assert_eq!(claims.aud, token_uri);
    assert_eq!(claims.iat, START_MS / 1000);
    assert_eq!(claims.exp - claims.iat, 3600);
}

#[tokio::test]
async fn service_account_reads_key_file() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"from-file","expires_in":1800}"#);
        })
        .await;

    let temp = TempDir::new().unwrap();
    let key_path = temp.path().join("service-account.json");
    let key = serde_json::json!({
        "client_email": "ci@project.iam.gserviceaccount.com",
        "private_key": RSA_PRIVATE,
        "token_uri": server.url("/oauth/token"),
    });
    std::fs::write(&key_path, key.to_string()).unwrap();

    let (auth, _clock) = manager();
    auth.set_credentials(
        "google-play",
        AuthCredentials::new(CredentialType::OAuth2).with_file(&key_path),
    );

    assert_eq!(auth.get_token("google-play").await.unwrap(), "from-file");
    mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn client_credentials_posts_grant() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .form_urlencoded_tuple("grant_type", "client_credentials")
                .form_urlencoded_tuple("client_id", "cid")
                .form_urlencoded_tuple("client_secret", "csecret");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"cc-token","expires_in":172800}"#);
        })
        .await;
    let (auth, _clock) = manager();
    auth.set_credentials(
        "huawei",
        AuthCredentials::client_credentials(server.url("/oauth2/token"), "cid", "csecret"),
    );

    assert_eq!(auth.get_token("huawei").await.unwrap(), "cc-token");
    mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn refresh_replaces_valid_token() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"cc-token","expires_in":3600}"#);
        })
        .await;
    let (auth, clock) = manager();
    auth.set_credentials(
        "microsoft",
        AuthCredentials::client_credentials(server.url("/oauth2/token"), "cid", "csecret"),
    );

    auth.get_token("microsoft").await.unwrap();
    clock.advance_ms(600_000);
    auth.refresh_token("microsoft").await.unwrap();
    mock.assert_calls_async(2).await;

    // The replacement was issued 10 minutes later, so it outlives the first
    clock.advance_ms(3_000_000);
    assert!(auth.is_token_valid("microsoft"));
}

#[tokio::test]
async fn concurrent_misses_share_one_refresh() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(200)
                .delay(std::time::Duration::from_millis(50))
                .header("content-type", "application/json")
                .body(r#"{"access_token":"shared","expires_in":3600}"#);
        })
        .await;
    let (auth, _clock) = manager();
    auth.set_credentials(
        "huawei",
        AuthCredentials::client_credentials(server.url("/oauth2/token"), "cid", "csecret"),
    );

    let (first, second, third) = tokio::join!(
        auth.get_token("huawei"),
        auth.get_token("huawei"),
        auth.get_token("huawei"),
    );

    assert_eq!(first.unwrap(), "shared");
    assert_eq!(second.unwrap(), "shared");
    assert_eq!(third.unwrap(), "shared");
    mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn replaced_credentials_win_over_in_flight_refresh() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(200)
                .delay(std::time::Duration::from_millis(300))
                .header("content-type", "application/json")
                .body(r#"{"access_token":"old-cc-token","expires_in":3600}"#);
        })
        .await;
    let (auth, _clock) = manager();
    auth.set_credentials(
        "x",
        AuthCredentials::client_credentials(server.url("/oauth2/token"), "cid", "csecret"),
    );

    let (in_flight, ()) = tokio::join!(auth.get_token("x"), async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        auth.set_credentials("x", AuthCredentials::api_key("new-key"));
    });

    assert_eq!(in_flight.unwrap(), "new-key");
    assert_eq!(auth.get_token("x").await.unwrap(), "new-key");
    mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn token_endpoint_errors_are_classified() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rejected");
            then.status(401).body("invalid_client");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/down");
            then.status(503).body("maintenance");
        })
        .await;
    let (auth, _clock) = manager();
    auth.set_credentials(
        "rejected",
        AuthCredentials::client_credentials(server.url("/rejected"), "cid", "bad"),
    );
    auth.set_credentials(
        "down",
        AuthCredentials::client_credentials(server.url("/down"), "cid", "csecret"),
    );

    let err = auth.get_token("rejected").await.unwrap_err();
    assert!(matches!(err, AuthError::TokenRejected { status: 401, .. }));
    assert!(err.is_fatal());

    let err = auth.get_token("down").await.unwrap_err();
    assert!(matches!(err, AuthError::TokenEndpointUnavailable { status: 503, .. }));
    assert!(!err.is_fatal());
    assert!(!auth.is_token_valid("down"));
}

#[tokio::test]
async fn jwt_token_is_local_and_short_lived() {
    let (auth, clock) = manager();
    auth.set_credentials(
        "apple",
        AuthCredentials::new(CredentialType::Jwt)
            .with("key_id", "ABC123DEFG")
            .with("issuer_id", "57246542-96fe-1a63-e053-0824d011072a")
            .with("private_key", EC_PRIVATE),
    );

    let token = auth.get_token("apple").await.unwrap();

    let header = decode_header(&token).unwrap();
    assert_eq!(header.alg, Algorithm::ES256);
    assert_eq!(header.kid.as_deref(), Some("ABC123DEFG"));
    assert_eq!(header.typ.as_deref(), Some("JWT"));

    let mut validation = Validation::new(Algorithm::ES256);
    validation.set_audience(&[APP_STORE_AUDIENCE]);
    validation.validate_exp = false;
    let claims = decode::<ApiTokenClaims>(
        &token,
        &DecodingKey::from_ec_pem(EC_PUBLIC.as_bytes()).unwrap(),
        &validation,
    )
    .unwrap()
    .claims;
    assert_eq!(claims.iss, "57246542-96fe-1a63-e053-0824d011072a");
    assert_eq!(claims.exp - claims.iat, 1200);

    // 20 minute lifetime minus the 60 second buffer
    clock.advance_ms(1_139_000);
    assert!(auth.is_token_valid("apple"));
    clock.advance_ms(1_000);
    assert!(!auth.is_token_valid("apple"));
}

#[tokio::test]
async fn jwt_with_missing_key_file_is_fatal() {
    let (auth, _clock) = manager();
    auth.set_credentials(
        "apple",
        AuthCredentials::new(CredentialType::Jwt)
            .with("key_id", "K")
            .with("issuer_id", "I")
            .with_file("/nonexistent/AuthKey_K.p8"),
    );

    let err = auth.get_token("apple").await.unwrap_err();
    assert!(matches!(err, AuthError::KeyFile { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn rsa_signature_is_order_independent() {
    let (auth, _clock) = manager();
    auth.set_credentials("xiaomi", AuthCredentials::rsa(RSA_PRIVATE));

    let mut forward = BTreeMap::new();
    forward.insert("a", "1");
    forward.insert("b", "2");
    let reversed = vec![("b", "2"), ("a", "1")];

    let first = auth
        .sign_request("xiaomi", "POST", "/dev/push", forward)
        .await
        .unwrap();
    let second = auth
        .sign_request("xiaomi", "POST", "/dev/push", reversed)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first, RSA_SIG_A1_B2.trim());

    let public = RsaPublicKey::from_public_key_pem(RSA_PUBLIC).unwrap();
    let verifying = VerifyingKey::<Sha256>::new(public);
    let raw = BASE64.decode(&first).unwrap();
    let signature = Signature::try_from(raw.as_slice()).unwrap();
    verifying.verify(b"a=1&b=2", &signature).unwrap();
}

#[tokio::test]
async fn rsa_signing_reads_key_file() {
    let temp = TempDir::new().unwrap();
    let key_path = temp.path().join("xiaomi.pem");
    std::fs::write(&key_path, RSA_PRIVATE).unwrap();

    let (auth, _clock) = manager();
    auth.set_credentials(
        "xiaomi",
        AuthCredentials::new(CredentialType::Rsa).with_file(&key_path),
    );

    let mut params = HashMap::new();
    params.insert("b".to_string(), "2".to_string());
    params.insert("a".to_string(), "1".to_string());
    let signature = auth
        .sign_request("xiaomi", "POST", "/dev/push", &params)
        .await
        .unwrap();
    assert_eq!(signature, RSA_SIG_A1_B2.trim());
}

#[tokio::test]
async fn hmac_signature_is_lowercase_hex() {
    let (auth, _clock) = manager();
    auth.set_credentials("vivo", AuthCredentials::hmac("secret"));

    let signature = auth.generate_hmac_signature("vivo", "a=1&b=2").unwrap();
    assert_eq!(
        signature,
        "604fe97c66c6393ff22e3cae366eee1131e351ebc736bf12f5d62e1755b7a233"
    );
}

#[tokio::test]
async fn load_credentials_from_descriptor_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("firebase.json");
    std::fs::write(&path, r#"{"type":"apikey","config":{"api_key":"from-disk"}}"#).unwrap();

    let (auth, _clock) = manager();
    auth.load_credentials("firebase", &path).await.unwrap();

    assert_eq!(auth.get_token("firebase").await.unwrap(), "from-disk");
}
