use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::extractors::TikTokExtractor;
use crate::models::{TranscribeRequest, TranscribeResponse};
use crate::parser::ClaudeParser;
use crate::pipeline::{PipelineError, PipelineOutcome, RecipePipeline};
use crate::store::SupabaseStore;
use crate::transcribe::WhisperTranscriber;

/// Shared handler state; every provider handle is built once at startup
#[derive(Clone)]
pub struct AppState {
    pub pipeline: RecipePipeline,
}

impl AppState {
    pub fn new(pipeline: RecipePipeline) -> Self {
        Self { pipeline }
    }

    /// Wire the production providers from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let source = TikTokExtractor::new(&config.downloader.yt_dlp_path, config.temp_dir());
        let transcriber = WhisperTranscriber::new(
            http.clone(),
            &config.transcription.api_key,
            &config.transcription.endpoint,
            &config.transcription.model,
        );
        let parser = ClaudeParser::new(http.clone(), &config.llm.api_key)
            .with_endpoint(&config.llm.endpoint)
            .with_model(&config.llm.model, config.llm.max_tokens)
            .with_lenient_json(config.llm.lenient_json);
        let store = SupabaseStore::new(http, &config.store.url, &config.store.anon_key);

        Ok(Self::new(RecipePipeline::new(
            Arc::new(source),
            Arc::new(transcriber),
            Arc::new(parser),
            Arc::new(store),
        )))
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}: {}", self.public_message(), self);
        } else {
            tracing::warn!("Rejected request: {}", self);
        }

        (status, Json(TranscribeResponse::error(self.public_message()))).into_response()
    }
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/transcribe", post(transcribe))
        .layer(cors_layer(cors_origins))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(TranscribeResponse::error("Internal server error")),
    )
        .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn transcribe(
    State(state): State<AppState>,
    payload: Result<Json<TranscribeRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return PipelineError::InvalidBody(rejection.body_text()).into_response(),
    };

    match state.pipeline.run(&req.url).await {
        Ok(PipelineOutcome::Created(tutorial)) => (
            StatusCode::CREATED,
            Json(TranscribeResponse::ok(
                "Tutorial transcribed and saved successfully",
                tutorial,
            )),
        )
            .into_response(),
        Ok(PipelineOutcome::Existing(tutorial)) => (
            StatusCode::OK,
            Json(TranscribeResponse::ok("Tutorial already exists", tutorial)),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: &Config, state: AppState) -> anyhow::Result<()> {
    let app = router(state, &config.server.cors_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Recipe Scribe starting on port {}", config.server.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutting down");
}
