//! OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait so the pipeline can run against Cloud
//! Vision in production and an in-memory stub under test.

pub mod google_vision;

/// Raw bytes of one uploaded image. Held for a single request only.
#[derive(Debug, Clone)]
pub struct ImageBytes {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl ImageBytes {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Async trait implemented by each OCR backend.
///
/// Returns the full recognised text, which may be empty when nothing was found.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn detect_text(&self, image: &ImageBytes) -> anyhow::Result<String>;
}
