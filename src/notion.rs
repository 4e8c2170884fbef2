//! Notion client for creating one database page per record.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::NotionConfig;
use crate::record::Record;

/// Why a page could not be created. `Display` is the user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Failed to create entry in Notion: {body}")]
    Rejected { status: u16, body: String },
    #[error("Error creating Notion entry: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Identifiers of the page Notion created, when it reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Destination for finished records.
#[async_trait::async_trait]
pub trait RecordWriter: Send + Sync {
    async fn create(&self, record: &Record) -> Result<CreatedPage, WriteError>;
}

/// Notion REST client configuration.
#[derive(Clone)]
pub struct NotionClient {
    client: Client,
    api_url: String,
    token: String,
    database_id: String,
    version: String,
}

impl NotionClient {
    pub fn new(config: &NotionConfig, client: Client) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            token: config.token.clone(),
            database_id: config.database_id.clone(),
            version: config.version.clone(),
        }
    }

    /// Create a page in the configured database.
    ///
    /// Only HTTP 200 counts as success. No idempotency key is sent, so calling
    /// this twice creates two pages.
    pub async fn create_page(&self, record: &Record) -> Result<CreatedPage, WriteError> {
        let url = format!("{}/v1/pages", self.api_url);

        let body = json!({
            "parent": {"database_id": self.database_id},
            "properties": record.to_properties(),
        });

        debug!(
            "Creating Notion page in database {} ({} chars)",
            self.database_id,
            record.content.chars().count()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .header("Notion-Version", &self.version)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(WriteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;

        // Identifiers are a convenience; an unexpected body still counts as created.
        let page: CreatedPage = serde_json::from_str(&text).unwrap_or_default();
        info!(
            "Created Notion page {}",
            page.id.as_deref().unwrap_or("(id not reported)")
        );
        Ok(page)
    }
}

#[async_trait::async_trait]
impl RecordWriter for NotionClient {
    async fn create(&self, record: &Record) -> Result<CreatedPage, WriteError> {
        self.create_page(record).await
    }
}
