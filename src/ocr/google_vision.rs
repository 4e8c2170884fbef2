//! Google Cloud Vision OCR provider (`DOCUMENT_TEXT_DETECTION`).

use super::{ImageBytes, OcrProvider};
use crate::config::VisionConfig;
use crate::google_auth::{self, AccessTokenSource};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub struct GoogleVisionProvider {
    api_url: String,
    tokens: Arc<dyn AccessTokenSource>,
    client: reqwest::Client,
}

impl GoogleVisionProvider {
    pub fn new(config: &VisionConfig, client: reqwest::Client) -> Self {
        Self::with_token_source(
            config.api_url.clone(),
            google_auth::token_source(&config.credentials),
            client,
        )
    }

    pub fn with_token_source(
        api_url: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            tokens,
            client,
        }
    }
}

// ── Vision API request/response types ───────────────────────────────────────

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Serialize)]
struct AnnotateImageRequest {
    image: Image,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct Image {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    feature_type: &'static str,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    full_text_annotation: Option<TextAnnotation>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for GoogleVisionProvider {
    fn name(&self) -> &str {
        "google_vision"
    }

    async fn detect_text(&self, image: &ImageBytes) -> anyhow::Result<String> {
        if image.is_empty() {
            anyhow::bail!("Image is empty");
        }

        let token = self.tokens.access_token(&self.client).await?;

        let body = AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: Image {
                    content: BASE64.encode(&image.data),
                },
                features: vec![Feature {
                    feature_type: "DOCUMENT_TEXT_DETECTION",
                }],
            }],
        };

        info!(
            "GoogleVisionProvider: annotating {} ({} bytes)",
            image.filename,
            image.len()
        );

        let resp = self
            .client
            .post(format!("{}/v1/images:annotate", self.api_url))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Cloud Vision API error ({}): {}", status, text);
        }

        let annotated: AnnotateResponse = resp.json().await?;
        let first = annotated
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Cloud Vision returned no responses"))?;

        if let Some(status) = first.error {
            anyhow::bail!("Cloud Vision error {}: {}", status.code, status.message);
        }

        let text = first
            .full_text_annotation
            .map(|annotation| annotation.text)
            .unwrap_or_default();

        debug!(
            "GoogleVisionProvider: detected {} chars",
            text.chars().count()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google_auth::StaticToken;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GoogleVisionProvider {
        GoogleVisionProvider::with_token_source(
            server.uri(),
            Arc::new(StaticToken("ya29.test".to_string())),
            reqwest::Client::new(),
        )
    }

    fn image() -> ImageBytes {
        ImageBytes::new("note.png", vec![0x89, b'P', b'N', b'G'])
    }

    #[tokio::test]
    async fn test_returns_full_text_annotation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/images:annotate"))
            .and(header("Authorization", "Bearer ya29.test"))
            .and(body_partial_json(serde_json::json!({
                "requests": [{
                    "image": {"content": BASE64.encode([0x89, b'P', b'N', b'G'])},
                    "features": [{"type": "DOCUMENT_TEXT_DETECTION"}]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "responses": [{"fullTextAnnotation": {"text": "Hello world\nsecond line"}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let text = provider(&mock_server).detect_text(&image()).await.unwrap();
        assert_eq!(text, "Hello world\nsecond line");
    }

    #[tokio::test]
    async fn test_no_annotation_is_empty_text() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/images:annotate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"responses": [{}]})),
            )
            .mount(&mock_server)
            .await;

        let text = provider(&mock_server).detect_text(&image()).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_per_image_error_is_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/images:annotate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "responses": [{"error": {"code": 3, "message": "Bad image data."}}]
            })))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .detect_text(&image())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Bad image data."));
    }

    #[tokio::test]
    async fn test_http_error_is_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/images:annotate"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .detect_text(&image())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("PERMISSION_DENIED"));
    }

    #[tokio::test]
    async fn test_empty_image_skips_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .detect_text(&ImageBytes::new("empty.png", Vec::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
