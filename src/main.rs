//! OCR to Notion - upload an image, read its text, file it as a Notion page.

mod config;
mod google_auth;
mod notion;
mod ocr;
mod pipeline;
mod record;
#[cfg(test)]
mod test_utils;
mod ui;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use config::AppConfig;
use notion::NotionClient;
use ocr::{google_vision::GoogleVisionProvider, ImageBytes};
use pipeline::{Pipeline, PipelineReport};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_to_notion=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!("Loaded config: {:?}", config);

    let http = reqwest::Client::new();
    let ocr = GoogleVisionProvider::new(&config.vision, http.clone());
    let notion = NotionClient::new(&config.notion, http);

    let state = AppState {
        pipeline: Arc::new(Pipeline::new(
            Arc::new(ocr),
            Arc::new(notion),
            chrono::Utc::now,
        )),
    };

    let app = router(state, config.server.max_upload_bytes);

    // Run server
    let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
    info!("Server listening on http://{}", config.server.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Upload page. Each upload replays the render step in `Pipeline::run`.
async fn index() -> Html<&'static str> {
    Html(ui::INDEX_HTML)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Receive an image and run it through OCR and the Notion write.
///
/// Pipeline failures come back as `200` with `state: "failed"`; only a
/// malformed or missing upload is an HTTP error.
async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PipelineReport>, (StatusCode, String)> {
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (e.status(), format!("Multipart error: {}", e.body_text()))
    })? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("image").to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(|e| {
                (e.status(), format!("Failed to read file: {}", e.body_text()))
            })?;

            let mut bytes = ImageBytes::new(filename, data.to_vec());
            if let Some(content_type) = content_type {
                bytes = bytes.with_content_type(content_type);
            }
            image = Some(bytes);
            break;
        }
    }

    let image = match image {
        Some(image) if !image.is_empty() => image,
        _ => {
            warn!("Upload request without a file");
            return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
        }
    };

    info!(
        "Received file: {} ({} bytes, {})",
        image.filename,
        image.len(),
        image.content_type.as_deref().unwrap_or("unknown type")
    );

    // Run to completion even if the client goes away mid-request.
    let pipeline = state.pipeline.clone();
    let report = tokio::spawn(async move { pipeline.run(image).await })
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Pipeline task failed: {}", e),
            )
        })?;

    info!("Upload finished in state {:?}", report.state);
    Ok(Json(report))
}
