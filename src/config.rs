//! Process configuration.
//!
//! Everything is read once from the environment (a `.env` file is honoured by
//! `main`) and then passed by reference into the clients. Nothing here is
//! global; tests build an [`AppConfig`] from a plain map via [`AppConfig::from_lookup`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_NOTION_API_URL: &str = "https://api.notion.com";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
pub const DEFAULT_VISION_API_URL: &str = "https://vision.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Top-level configuration, immutable after start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub notion: NotionConfig,
    pub vision: VisionConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
}

/// Settings for the Notion page writer.
#[derive(Clone)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    pub api_url: String,
    pub version: String,
}

/// Settings for the Cloud Vision OCR client.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_url: String,
    pub credentials: VisionCredentials,
}

/// How the OCR client authenticates.
#[derive(Clone)]
pub enum VisionCredentials {
    /// Mint access tokens from a service account (the normal deployment).
    ServiceAccount(ServiceAccountKey),
    /// A pre-minted access token, e.g. from `gcloud auth print-access-token`.
    AccessToken(String),
}

/// Google service-account fields, either from individual env vars or a key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub client_id: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub auth_uri: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub auth_provider_x509_cert_url: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub client_x509_cert_url: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// Secrets stay out of logs.
impl std::fmt::Debug for NotionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionConfig")
            .field("database_id", &self.database_id)
            .field("api_url", &self.api_url)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for VisionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceAccount(key) => f
                .debug_struct("ServiceAccount")
                .field("client_email", &key.client_email)
                .field("project_id", &key.project_id)
                .finish_non_exhaustive(),
            Self::AccessToken(_) => f.write_str("AccessToken(..)"),
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).with_context(|| format!("{} environment variable not set", key))
        };

        let bind_addr: SocketAddr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR is not a valid socket address")?;
        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .context("MAX_UPLOAD_BYTES is not a valid byte count")?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let notion = NotionConfig {
            token: require("NOTION_TOKEN")?,
            database_id: require("DATABASE_ID")?,
            api_url: get("NOTION_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_NOTION_API_URL.to_string()),
            version: get("NOTION_VERSION").unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
        };

        let vision = VisionConfig {
            api_url: get("VISION_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_VISION_API_URL.to_string()),
            credentials: vision_credentials(&get)?,
        };

        Ok(Self {
            server: ServerConfig {
                bind_addr,
                max_upload_bytes,
            },
            notion,
            vision,
        })
    }
}

/// Resolve OCR credentials: key file first, then individual fields, then a raw token.
fn vision_credentials<G>(get: &G) -> Result<VisionCredentials>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(path) = get("GOOGLE_APPLICATION_CREDENTIALS") {
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read service account key: {}", path))?;
        let mut key: ServiceAccountKey = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse service account key: {}", path))?;
        key.private_key = unescape_newlines(&key.private_key);
        return Ok(VisionCredentials::ServiceAccount(key));
    }

    if let (Some(client_email), Some(private_key)) =
        (get("GOOGLE_CLIENT_EMAIL"), get("GOOGLE_PRIVATE_KEY"))
    {
        return Ok(VisionCredentials::ServiceAccount(ServiceAccountKey {
            project_id: get("GOOGLE_PROJECT_ID"),
            private_key_id: get("GOOGLE_PRIVATE_KEY_ID"),
            private_key: unescape_newlines(&private_key),
            client_email,
            client_id: get("GOOGLE_CLIENT_ID"),
            auth_uri: get("GOOGLE_AUTH_URI"),
            token_uri: get("GOOGLE_TOKEN_URI").unwrap_or_else(default_token_uri),
            auth_provider_x509_cert_url: get("GOOGLE_AUTH_PROVIDER_X509_CERT_URL"),
            client_x509_cert_url: get("GOOGLE_CLIENT_X509_CERT_URL"),
        }));
    }

    if let Some(token) = get("GOOGLE_ACCESS_TOKEN") {
        return Ok(VisionCredentials::AccessToken(token));
    }

    anyhow::bail!(
        "Google credentials not set: provide GOOGLE_CLIENT_EMAIL and GOOGLE_PRIVATE_KEY, \
         GOOGLE_APPLICATION_CREDENTIALS, or GOOGLE_ACCESS_TOKEN"
    )
}

/// Private keys pasted into `.env` files usually carry literal `\n` sequences.
fn unescape_newlines(raw: &str) -> String {
    raw.replace("\\n", "\n")
}
