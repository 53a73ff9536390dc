//! Google OAuth access tokens for Vertex AI, Firestore and BigQuery.
//!
//! A static `GOOGLE_OAUTH_ACCESS_TOKEN` wins when set. Otherwise tokens are
//! minted from the service-account key named by
//! `GOOGLE_APPLICATION_CREDENTIALS` with the JWT-bearer grant and cached
//! until shortly before they expire.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::GoogleConfig;
use crate::logging::OpTimer;

/// Scope covering Vertex AI, Firestore and BigQuery.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Lifetime requested for each signed assertion. Google caps it at one hour.
const ASSERTION_TTL_SECS: i64 = 3600;
/// Cached tokens are replaced this long before Google expires them.
const REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(
        "Google Cloud credentials are not configured (set GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_OAUTH_ACCESS_TOKEN)"
    )]
    NotConfigured,
    #[error("failed to read service account key {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid service account key: {0}")]
    InvalidKey(String),
    #[error("failed to sign token request: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// The fields of a service-account JSON key that token minting needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self, AuthError> {
        serde_json::from_str(raw).map_err(|e| AuthError::InvalidKey(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| AuthError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_TTL_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

struct ServiceAccountTokens {
    client: Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokens")
            .field("client_email", &self.key.client_email)
            .field("token_uri", &self.key.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountTokens {
    /// Signed JWT-bearer assertion for the cloud-platform scope.
    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_TTL_SECS,
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.signing_key,
        )?)
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken, AuthError> {
        let assertion = self.sign_assertion(now)?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status { status, body });
        }

        let token: TokenResponse = response.json().await?;
        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + TimeDelta::seconds(token.expires_in),
        })
    }

    /// Cached token, or a freshly minted one. The lock is held while minting
    /// so concurrent callers share one exchange.
    async fn token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let timer = OpTimer::new("auth", "mint_access_token");
        let minted = self.exchange(now).await;
        timer.finish_with_result(&minted);
        let minted = minted?;
        tracing::debug!(
            client_email = %self.key.client_email,
            expires_at = %minted.expires_at,
            "Minted Google access token"
        );

        let value = minted.value.clone();
        *cached = Some(minted);
        Ok(value)
    }
}

#[derive(Debug)]
enum TokenSource {
    Static(String),
    ServiceAccount(ServiceAccountTokens),
}

/// Bearer tokens for Google Cloud REST calls. Cheap to clone; clones share
/// the token cache.
#[derive(Debug, Clone, Default)]
pub struct GoogleAuth {
    source: Option<Arc<TokenSource>>,
}

impl GoogleAuth {
    /// No credentials: every [`token`](Self::token) call fails with
    /// [`AuthError::NotConfigured`].
    pub fn none() -> Self {
        Self::default()
    }

    /// A fixed, pre-minted token.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            source: Some(Arc::new(TokenSource::Static(token.into()))),
        }
    }

    pub fn service_account(client: Client, key: ServiceAccountKey) -> Result<Self, AuthError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(Self {
            source: Some(Arc::new(TokenSource::ServiceAccount(ServiceAccountTokens {
                client,
                key,
                signing_key,
                cached: Mutex::new(None),
            }))),
        })
    }

    /// Static token first, then the service-account key file. An unreadable
    /// or malformed key file is an error.
    pub fn from_config(client: Client, google: &GoogleConfig) -> Result<Self, AuthError> {
        if let Some(token) = google.access_token.as_deref() {
            return Ok(Self::fixed(token));
        }
        match google.credentials_path.as_deref() {
            Some(path) => Self::service_account(client, ServiceAccountKey::from_file(path)?),
            None => Ok(Self::none()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    /// Label for startup logs.
    pub fn kind(&self) -> &'static str {
        match self.source.as_deref() {
            None => "none",
            Some(TokenSource::Static(_)) => "static token",
            Some(TokenSource::ServiceAccount(_)) => "service account",
        }
    }

    pub async fn token(&self) -> Result<String, AuthError> {
        match self.source.as_deref() {
            None => Err(AuthError::NotConfigured),
            Some(TokenSource::Static(token)) => Ok(token.clone()),
            Some(TokenSource::ServiceAccount(tokens)) => tokens.token().await,
        }
    }
}
