//! Google OAuth2 access tokens for the Cloud Vision API.
//!
//! A service account signs an RS256 JWT which is exchanged at the token URI for
//! a short-lived access token. Tokens are cached until shortly before expiry.
//! A pre-minted token can be used instead for local runs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::{ServiceAccountKey, VisionCredentials};

pub const VISION_SCOPE: &str = "https://www.googleapis.com/auth/cloud-vision";

/// Seconds before expiry at which a cached token is considered stale.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Anything that can hand out a bearer token for Google APIs.
#[async_trait::async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self, client: &reqwest::Client) -> Result<String>;
}

/// Build the token source matching the configured credentials.
pub fn token_source(credentials: &VisionCredentials) -> Arc<dyn AccessTokenSource> {
    match credentials {
        VisionCredentials::ServiceAccount(key) => {
            info!(
                "Using service account {} for Cloud Vision",
                key.client_email
            );
            Arc::new(ServiceAccountTokens::new(key.clone(), VISION_SCOPE))
        }
        VisionCredentials::AccessToken(token) => {
            info!("Using pre-minted access token for Cloud Vision");
            Arc::new(StaticToken(token.clone()))
        }
    }
}

/// A fixed token, never refreshed.
pub struct StaticToken(pub String);

#[async_trait::async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self, _client: &reqwest::Client) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Service-account JWT bearer flow with an in-memory token cache.
pub struct ServiceAccountTokens {
    key: ServiceAccountKey,
    scope: String,
    token_cache: Mutex<Option<CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

#[derive(serde::Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountTokens {
    pub fn new(key: ServiceAccountKey, scope: impl Into<String>) -> Self {
        Self {
            key,
            scope: scope.into(),
            token_cache: Mutex::new(None),
        }
    }

    fn cached(&self, now: i64) -> Option<String> {
        let cache = self.token_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .as_ref()
            .filter(|cached| now < cached.expires_at - EXPIRY_MARGIN_SECS)
            .map(|cached| cached.access_token.clone())
    }

    /// Sign the assertion JWT for the token exchange.
    fn sign_assertion(&self, now: i64) -> Result<String> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };

        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("Invalid RSA private key in service account credentials")?;

        jsonwebtoken::encode(&header, &claims, &encoding_key).context("Failed to encode JWT")
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for ServiceAccountTokens {
    async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        if let Some(token) = self.cached(now) {
            return Ok(token);
        }

        let jwt = self.sign_assertion(now)?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        debug!("Exchanging service account JWT at {}", self.key.token_uri);

        let resp: TokenResponse = client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .context("Token exchange request failed")?
            .error_for_status()
            .context("Token exchange returned error")?
            .json()
            .await
            .context("Failed to parse token response")?;

        let token = resp.access_token.clone();
        {
            let mut cache = self.token_cache.lock().unwrap_or_else(|e| e.into_inner());
            *cache = Some(CachedToken {
                access_token: resp.access_token,
                expires_at: now + resp.expires_in,
            });
        }

        debug!("Minted access token valid for {}s", resp.expires_in);
        Ok(token)
    }
}
