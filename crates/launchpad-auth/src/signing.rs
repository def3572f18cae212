//! Signing primitives
//!
//! Stateless helpers for every authorization family:
//! - ES256 JWT issuance (App Store Connect style)
//! - RS256 service-account assertions and OAuth2 token exchange
//! - RSA-SHA256 signatures over canonicalized parameters
//! - HMAC-SHA256 signatures

use crate::error::{AuthError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Audience expected by App Store Connect tokens
pub const APP_STORE_AUDIENCE: &str = "appstoreconnect-v1";

/// Lifetime of an ES256 token; the protocol maximum is 20 minutes
pub const JWT_LIFETIME_SECS: i64 = 1200;

/// Lifetime requested for service-account assertions
pub const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Grant type for the service-account JWT bearer flow
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Claims of an ES256 API token
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiTokenClaims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

/// Claims of a service-account assertion
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// OAuth token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

/// Issue an ES256 JWT signed with a PKCS#8 EC private key
pub fn issue_es256_jwt(
    backend: &str,
    private_key_pem: &str,
    key_id: &str,
    issuer_id: &str,
    now_secs: i64,
) -> Result<String> {
    let encoding_key =
        EncodingKey::from_ec_pem(private_key_pem.as_bytes()).map_err(|e| AuthError::InvalidKey {
            backend: backend.to_string(),
            reason: e.to_string(),
        })?;

    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(key_id.to_string());

    let claims = ApiTokenClaims {
        iss: issuer_id.to_string(),
        iat: now_secs,
        exp: now_secs + JWT_LIFETIME_SECS,
        aud: APP_STORE_AUDIENCE.to_string(),
    };

    Ok(encode(&header, &claims, &encoding_key)?)
}

/// Build the RS256 assertion for the service-account JWT bearer grant
pub fn service_account_assertion(
    backend: &str,
    client_email: &str,
    private_key_pem: &str,
    scope: &str,
    token_uri: &str,
    now_secs: i64,
) -> Result<String> {
    let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).map_err(|e| {
        AuthError::InvalidKey {
            backend: backend.to_string(),
            reason: e.to_string(),
        }
    })?;

    let claims = AssertionClaims {
        iss: client_email.to_string(),
        scope: scope.to_string(),
        aud: token_uri.to_string(),
        iat: now_secs,
        exp: now_secs + ASSERTION_LIFETIME_SECS,
    };

    Ok(encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)?)
}

/// POST a form to a token endpoint and parse the access token
///
/// 4xx responses are reported as rejected credentials, 5xx as an unavailable
/// endpoint so that callers can decide whether to retry.
pub async fn exchange_token(
    client: &Client,
    backend: &str,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    debug!(backend, token_url, "Exchanging credentials for access token");

    let response = client.post(token_url).form(form).send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(if status.is_server_error() {
            AuthError::TokenEndpointUnavailable {
                backend: backend.to_string(),
                status: status.as_u16(),
                body,
            }
        } else {
            AuthError::TokenRejected {
                backend: backend.to_string(),
                status: status.as_u16(),
                body,
            }
        });
    }

    Ok(response.json().await?)
}

/// Join parameters as `k=v` pairs sorted by key, separated by `&`
///
/// The output does not depend on the iteration order of `params`.
pub fn canonicalize_params<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(K, V)> = params.into_iter().collect();
    pairs.sort_by(|a, b| {
        a.0.as_ref()
            .cmp(b.0.as_ref())
            .then_with(|| a.1.as_ref().cmp(b.1.as_ref()))
    });

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
        .collect::<Vec<_>>()
        .join("&")
}

/// Parse an RSA private key from PKCS#8 or PKCS#1 PEM
pub fn parse_rsa_private_key(backend: &str, pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| AuthError::InvalidKey {
            backend: backend.to_string(),
            reason: e.to_string(),
        })
}

/// RSA-SHA256 (PKCS#1 v1.5) signature, base64 encoded
pub fn rsa_sha256_sign(backend: &str, private_key_pem: &str, message: &str) -> Result<String> {
    let key = parse_rsa_private_key(backend, private_key_pem)?;
    let signing_key = SigningKey::<Sha256>::new(key);
    let signature = signing_key.sign(message.as_bytes());
    Ok(BASE64.encode(signature.to_bytes()))
}

/// HMAC-SHA256 of `message`, lowercase hex
pub fn hmac_sha256_hex(backend: &str, secret: &str, message: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| AuthError::InvalidKey {
            backend: backend.to_string(),
            reason: e.to_string(),
        })?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
