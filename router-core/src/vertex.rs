//! Vertex Token Service (§4.3): exchanges a service-account JWT assertion
//! for a Google OAuth2 access token, or short-circuits to a pre-supplied
//! environment token.
//!
//! There is no ready-made JWT-bearer exchange in the ancestor pack — the
//! SDK's `providers/google.rs` only ever consumes a static bearer key. This
//! module is grounded on that file's HTTP-client and error-handling
//! conventions, and on the gateway's `auth.rs` use of `jsonwebtoken` for its
//! own (unrelated) session tokens, reused here for RS256 assertion signing.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RouterError;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const REFRESH_SKEW_MS: i64 = 60_000;

/// The pre-supplied environment variables checked before attempting a JWT
/// exchange, in the documented order.
pub const ENV_TOKEN_CANDIDATES: [&str; 3] =
    ["VERTEX_ACCESS_TOKEN", "GOOGLE_VERTEX_TOKEN", "GCP_ACCESS_TOKEN"];

#[derive(Debug, Deserialize)]
struct ServiceAccountFile {
    client_email: String,
    private_key: String,
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at_ms: i64,
}

/// Caches a single Vertex access token and refreshes it near expiry.
pub struct VertexTokenService {
    http: reqwest::Client,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl VertexTokenService {
    pub fn new() -> Self {
        Self::with_token_url(TOKEN_URL)
    }

    /// Same as [`Self::new`] but exchanges against `token_url` instead of the
    /// literal Google endpoint — lets the S6 wiremock test drive caching
    /// behaviour through this service's own public API instead of a bare
    /// `reqwest::Client` pointed at the mock server.
    pub fn with_token_url(token_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: token_url.into(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a usable access token, reusing the cached one while
    /// `expiresAt > now + 60_000ms` (§4.3 "Cache refresh").
    pub async fn get_token(&self, credentials_path: &str) -> Result<String, RouterError> {
        for var in ENV_TOKEN_CANDIDATES {
            if let Ok(token) = std::env::var(var) {
                if !token.is_empty() {
                    return Ok(token);
                }
            }
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        {
            let cached = self.cached.lock().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at_ms > now_ms + REFRESH_SKEW_MS {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let fresh = self.exchange(credentials_path).await?;
        let mut cached = self.cached.lock().await;
        // Idempotent under contention (§5): a duplicated exchange is
        // acceptable, but never hand out a token staler than what's cached.
        if cached.as_ref().map(|t| t.expires_at_ms).unwrap_or(0) < fresh.expires_at_ms {
            *cached = Some(fresh.clone());
        }
        Ok(fresh.access_token)
    }

    async fn exchange(&self, credentials_path: &str) -> Result<CachedToken, RouterError> {
        let contents = std::fs::read_to_string(credentials_path).map_err(|e| RouterError::AuthFailed {
            provider: "gemini".to_string(),
            message: format!("failed to read Vertex credentials file: {e}"),
        })?;
        let account: ServiceAccountFile =
            serde_json::from_str(&contents).map_err(|e| RouterError::AuthFailed {
                provider: "gemini".to_string(),
                message: format!("invalid Vertex credentials file: {e}"),
            })?;

        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: account.client_email,
            scope: SCOPE.to_string(),
            aud: self.token_url.clone(),
            iat: now,
            exp: now + 3600,
        };
        let encoding_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| RouterError::AuthFailed {
                provider: "gemini".to_string(),
                message: format!("invalid Vertex private key: {e}"),
            })?;
        let assertion = encode(&Header::new(jsonwebtoken::Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| RouterError::AuthFailed {
                provider: "gemini".to_string(),
                message: format!("failed to sign Vertex assertion: {e}"),
            })?;

        let body = [("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())];
        let response = self
            .http
            .post(&self.token_url)
            .form(&body)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| RouterError::AuthFailed {
                provider: "gemini".to_string(),
                message: format!("Vertex token request failed: {e}"),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RouterError::AuthFailed {
                provider: "gemini".to_string(),
                message: format!("Vertex token exchange failed with status {status}: {text}"),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&text).map_err(|e| RouterError::AuthFailed {
            provider: "gemini".to_string(),
            message: format!("invalid Vertex token response: {e}"),
        })?;

        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at_ms: chrono::Utc::now().timestamp_millis() + parsed.expires_in * 1000,
        })
    }
}

impl Default for VertexTokenService {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedVertexTokenService = Arc<VertexTokenService>;
