//! In-memory OCR and writer stubs shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::notion::{CreatedPage, RecordWriter, WriteError};
use crate::ocr::{ImageBytes, OcrProvider};
use crate::record::Record;

/// Maps every image to a fixed OCR result.
pub struct StubOcr {
    result: Result<String, String>,
    calls: AtomicUsize,
}

impl StubOcr {
    pub fn text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl OcrProvider for StubOcr {
    fn name(&self) -> &str {
        "stub"
    }

    async fn detect_text(&self, _image: &ImageBytes) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

/// Keeps every record it is handed and answers with a fixed HTTP status.
pub struct StubWriter {
    status: u16,
    body: String,
    records: Mutex<Vec<Record>>,
}

impl StubWriter {
    pub fn status(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_string(),
            records: Mutex::new(Vec::new()),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::status(200, "")
    }

    pub fn calls(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RecordWriter for StubWriter {
    async fn create(&self, record: &Record) -> Result<CreatedPage, WriteError> {
        self.records.lock().unwrap().push(record.clone());
        if self.status == 200 {
            Ok(CreatedPage {
                id: Some("page-1".to_string()),
                url: Some("https://www.notion.so/page-1".to_string()),
            })
        } else {
            Err(WriteError::Rejected {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }
}
