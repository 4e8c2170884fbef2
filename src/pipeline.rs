//! Upload pipeline: OCR → display → Notion write.
//!
//! [`Pipeline::run`] drives one [`Session`] through its states and turns every
//! outcome into a [`PipelineReport`] the UI can render. Errors never escape;
//! they become an error [`Banner`] and the `Failed` state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::notion::{CreatedPage, RecordWriter, WriteError};
use crate::ocr::{ImageBytes, OcrProvider};
use crate::record::Record;

/// Source of capture timestamps.
pub type Clock = fn() -> DateTime<Utc>;

/// UI-visible states of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingUpload,
    Processing,
    Displayed,
    Persisted,
    Failed,
}

impl SessionState {
    /// Whether `self → next` is a legal step.
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, AwaitingUpload)
                | (AwaitingUpload, Processing)
                | (Processing, Displayed)
                | (Processing, Failed)
                | (Displayed, Persisted)
                | (Displayed, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Persisted | SessionState::Failed)
    }
}

/// Pipeline failures. `Display` is the inline message shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Error detecting text: {0}")]
    Ocr(String),
    #[error("No text was detected in the image.")]
    NoText,
    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerLevel {
    Success,
    Error,
}

/// The success/error line under the upload control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Banner {
    pub level: BannerLevel,
    pub message: String,
}

impl Banner {
    fn success(message: impl Into<String>) -> Self {
        Self {
            level: BannerLevel::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: BannerLevel::Error,
            message: message.into(),
        }
    }
}

/// State of a single upload as it moves through the pipeline.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    history: Vec<SessionState>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// The UI has been rendered and accepts a file.
    pub fn render(&mut self) {
        self.advance(SessionState::AwaitingUpload);
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition(next),
            "Unexpected session transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

/// Everything the UI needs after one upload.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub state: SessionState,
    pub transitions: Vec<SessionState>,
    /// Extracted text; stays set even when the write fails.
    pub text: Option<String>,
    pub record: Option<Record>,
    pub page: Option<CreatedPage>,
    pub banner: Banner,
}

/// Sequences OCR, record building and the write for each upload.
#[derive(Clone)]
pub struct Pipeline {
    ocr: Arc<dyn OcrProvider>,
    writer: Arc<dyn RecordWriter>,
    clock: Clock,
}

pub const SUCCESS_MESSAGE: &str = "Entry successfully created in Notion.";

impl Pipeline {
    pub fn new(ocr: Arc<dyn OcrProvider>, writer: Arc<dyn RecordWriter>, clock: Clock) -> Self {
        Self { ocr, writer, clock }
    }

    /// Run a fresh session for one uploaded image.
    pub async fn run(&self, image: ImageBytes) -> PipelineReport {
        let mut session = Session::new();
        session.render();
        self.run_session(&mut session, image).await
    }

    /// Drive `session` (expected to be awaiting an upload) to a terminal state.
    pub async fn run_session(&self, session: &mut Session, image: ImageBytes) -> PipelineReport {
        session.advance(SessionState::Processing);
        info!(
            "Processing {} ({} bytes) with {}",
            image.filename,
            image.len(),
            self.ocr.name()
        );

        let text = match self.extract(&image).await {
            Ok(text) => text,
            Err(err) => {
                warn!("OCR step failed for {}: {}", image.filename, err);
                session.advance(SessionState::Failed);
                return report(session, None, None, None, Banner::error(err.to_string()));
            }
        };
        // The image is no longer needed once text is out.
        drop(image);
        session.advance(SessionState::Displayed);

        let record = Record::build(&text, (self.clock)());
        match self.writer.create(&record).await {
            Ok(page) => {
                session.advance(SessionState::Persisted);
                report(
                    session,
                    Some(text),
                    Some(record),
                    Some(page),
                    Banner::success(SUCCESS_MESSAGE),
                )
            }
            Err(err) => {
                if let WriteError::Rejected { status, .. } = &err {
                    warn!("Notion rejected the page with HTTP {}", status);
                }
                let err = PipelineError::from(err);
                warn!("Write step failed: {}", err);
                session.advance(SessionState::Failed);
                report(
                    session,
                    Some(text),
                    Some(record),
                    None,
                    Banner::error(err.to_string()),
                )
            }
        }
    }

    /// OCR call; empty text is a failure like any other.
    async fn extract(&self, image: &ImageBytes) -> Result<String, PipelineError> {
        let text = self
            .ocr
            .detect_text(image)
            .await
            .map_err(|e| PipelineError::Ocr(format!("{:#}", e)))?;
        if text.is_empty() {
            return Err(PipelineError::NoText);
        }
        Ok(text)
    }
}

fn report(
    session: &Session,
    text: Option<String>,
    record: Option<Record>,
    page: Option<CreatedPage>,
    banner: Banner,
) -> PipelineReport {
    debug_assert!(session.state().is_terminal());
    PipelineReport {
        state: session.state(),
        transitions: session.history().to_vec(),
        text,
        record,
        page,
        banner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StubOcr, StubWriter};
    use chrono::TimeZone;

    fn new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn pipeline(ocr: Arc<StubOcr>, writer: Arc<StubWriter>) -> Pipeline {
        Pipeline::new(ocr, writer, new_year)
    }

    fn upload() -> ImageBytes {
        ImageBytes::new("note.png", vec![1, 2, 3])
    }

    #[test]
    fn test_transition_table() {
        use SessionState::*;
        assert!(Idle.can_transition(AwaitingUpload));
        assert!(AwaitingUpload.can_transition(Processing));
        assert!(Processing.can_transition(Displayed));
        assert!(Processing.can_transition(Failed));
        assert!(Displayed.can_transition(Persisted));
        assert!(Displayed.can_transition(Failed));

        assert!(!Idle.can_transition(Processing));
        assert!(!AwaitingUpload.can_transition(Failed));
        assert!(!Processing.can_transition(Persisted));
        assert!(!Persisted.can_transition(Failed));
        assert!(!Failed.can_transition(Processing));
        assert!(Persisted.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_render_awaits_upload() {
        let mut session = Session::new();
        assert_eq!(session.state(), SessionState::Idle);
        session.render();
        assert_eq!(session.state(), SessionState::AwaitingUpload);
        assert_eq!(
            session.history(),
            &[SessionState::Idle, SessionState::AwaitingUpload]
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Unexpected session transition")]
    fn test_out_of_order_step_panics() {
        let mut session = Session::new();
        session.advance(SessionState::Processing);
    }

    #[tokio::test]
    async fn test_hello_world_persisted() {
        let writer = StubWriter::ok();
        let report = pipeline(StubOcr::text("Hello world"), writer.clone())
            .run(upload())
            .await;

        assert_eq!(report.state, SessionState::Persisted);
        assert_eq!(
            report.transitions,
            vec![
                SessionState::Idle,
                SessionState::AwaitingUpload,
                SessionState::Processing,
                SessionState::Displayed,
                SessionState::Persisted,
            ]
        );
        assert_eq!(report.text.as_deref(), Some("Hello world"));
        assert_eq!(report.banner, Banner::success(SUCCESS_MESSAGE));
        assert_eq!(report.page.and_then(|p| p.id).as_deref(), Some("page-1"));

        let written = writer.records();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].name, "New Entry");
        assert_eq!(written[0].content, "Hello world");
        assert_eq!(written[0].date.start, "2024-01-01T00:00:00Z");
        assert_eq!(written[0].date.end, None);
    }

    #[tokio::test]
    async fn test_empty_text_fails_without_write() {
        let writer = StubWriter::ok();
        let report = pipeline(StubOcr::text(""), writer.clone())
            .run(upload())
            .await;

        assert_eq!(report.state, SessionState::Failed);
        assert_eq!(writer.calls(), 0);
        assert!(report.text.is_none());
        assert!(report.record.is_none());
        assert_eq!(report.banner.level, BannerLevel::Error);
        assert_eq!(report.banner.message, PipelineError::NoText.to_string());
        assert_eq!(
            report.transitions.last().copied(),
            Some(SessionState::Failed)
        );
        assert!(!report.transitions.contains(&SessionState::Displayed));
    }

    #[tokio::test]
    async fn test_whitespace_only_text_is_persisted_verbatim() {
        let writer = StubWriter::ok();
        let report = pipeline(StubOcr::text(" \n"), writer.clone())
            .run(upload())
            .await;

        assert_eq!(report.state, SessionState::Persisted);
        assert_eq!(writer.calls(), 1);
        assert_eq!(report.text.as_deref(), Some(" \n"));
        assert_eq!(writer.records()[0].content, " \n");
    }

    #[tokio::test]
    async fn test_ocr_error_fails_without_write() {
        let writer = StubWriter::ok();
        let report = pipeline(StubOcr::failing("permission denied"), writer.clone())
            .run(upload())
            .await;

        assert_eq!(report.state, SessionState::Failed);
        assert_eq!(writer.calls(), 0);
        assert_eq!(
            report.banner.message,
            "Error detecting text: permission denied"
        );
    }

    #[tokio::test]
    async fn test_write_rejection_keeps_text_and_body() {
        let body = r#"{"object":"error","code":"unauthorized"}"#;
        let writer = StubWriter::status(401, body);
        let report = pipeline(StubOcr::text("Hello world"), writer.clone())
            .run(upload())
            .await;

        assert_eq!(report.state, SessionState::Failed);
        assert_eq!(writer.calls(), 1);
        assert_eq!(report.text.as_deref(), Some("Hello world"));
        assert!(report.transitions.contains(&SessionState::Displayed));
        assert_eq!(report.banner.level, BannerLevel::Error);
        assert!(report.banner.message.contains(body));
        assert!(report.page.is_none());
    }

    #[tokio::test]
    async fn test_content_matches_ocr_output_exactly() {
        let text = "  Dear diary,\n\n  ünïcödé & <tags>\t\n";
        let writer = StubWriter::ok();
        let report = pipeline(StubOcr::text(text), writer.clone())
            .run(upload())
            .await;

        assert_eq!(report.record.map(|r| r.content).as_deref(), Some(text));
        assert_eq!(writer.records()[0].content, text);
    }

    #[tokio::test]
    async fn test_each_run_starts_fresh() {
        let ocr = StubOcr::text("again");
        let writer = StubWriter::ok();
        let pipeline = pipeline(ocr.clone(), writer.clone());

        let first = pipeline.run(upload()).await;
        let second = pipeline.run(upload()).await;

        assert_eq!(first.transitions, second.transitions);
        assert_eq!(ocr.calls(), 2);
        assert_eq!(writer.calls(), 2);
    }
}
