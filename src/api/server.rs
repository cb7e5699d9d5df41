//! HTTP server for the pipeline API.
//!
//! # API Endpoints
//!
//! | Method | Path                | Description                           |
//! |--------|---------------------|---------------------------------------|
//! | GET    | `/health`           | Health check                          |
//! | POST   | `/dp/pipeline/run`  | Run a pipeline over an uploaded file  |
//! | POST   | `/dp/pipeline/save` | Store a pipeline under a unique name  |
//! | GET    | `/dp/pipeline/get`  | Fetch a stored pipeline by name       |
//! | GET    | `/api/logs`         | SSE stream for real-time logs         |

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Multipart, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, RunResponse, SavePipelineRequest, SavePipelineResponse};
use crate::error::{ServerError, StoreError};
use crate::ops::Pipeline;
use crate::parser::ingest_bytes_auto;
use crate::store::PipelineRegistry;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Pipeline(_) | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Store(StoreError::Duplicate(_)) => StatusCode::BAD_REQUEST,
            ServerError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Store(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

#[derive(Clone)]
struct AppState {
    registry: Arc<Mutex<PipelineRegistry>>,
}

impl AppState {
    fn lock_registry(&self) -> Result<std::sync::MutexGuard<'_, PipelineRegistry>, ServerError> {
        self.registry
            .lock()
            .map_err(|_| ServerError::Internal("registry lock poisoned".into()))
    }
}

/// Start the HTTP server.
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let registry = PipelineRegistry::from_env()?;
    let state = AppState {
        registry: Arc::new(Mutex::new(registry)),
    };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/dp/pipeline/run", post(run_pipeline))
        .route("/dp/pipeline/save", post(save_pipeline))
        .route("/dp/pipeline/get", get(get_pipeline))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("tabpipe server running on http://localhost:{port}");
    println!("  POST /dp/pipeline/run  - Run a pipeline over an uploaded file");
    println!("  POST /dp/pipeline/save - Store a pipeline by name");
    println!("  GET  /dp/pipeline/get  - Fetch a stored pipeline");
    println!("  GET  /api/logs         - SSE log stream");
    println!("  GET  /health           - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tabpipe",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming.
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Run a pipeline over an uploaded delimited-text file.
///
/// Multipart fields: `file` (the dataset) and `pipeline_json` (the pipeline
/// document as text). A malformed pipeline is rejected before the file is
/// parsed.
async fn run_pipeline(mut multipart: Multipart) -> Result<Json<RunResponse>, ServerError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut pipeline_json: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("multipart error: {e}")))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("read error: {e}")))?;
                file_bytes = Some(bytes.to_vec());
            }
            "pipeline_json" => {
                pipeline_json = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ServerError::BadRequest(format!("read error: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| ServerError::BadRequest("no file provided".into()))?;
    let text =
        pipeline_json.ok_or_else(|| ServerError::BadRequest("no pipeline_json provided".into()))?;

    let pipeline = Pipeline::from_json_str(&text)?;

    log_info(format!(
        "run: {} ({} bytes, {} steps)",
        file_name.as_deref().unwrap_or("upload"),
        bytes.len(),
        pipeline.len()
    ));

    let ingested =
        ingest_bytes_auto(&bytes).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let result = pipeline.execute(&ingested.frame).map_err(|e| {
        log_error(e.to_string());
        e
    })?;

    Ok(Json(RunResponse::from(&result)))
}

/// Store a pipeline under a unique name.
async fn save_pipeline(
    State(state): State<AppState>,
    Json(request): Json<SavePipelineRequest>,
) -> Result<Json<SavePipelineResponse>, ServerError> {
    if request.name.trim().is_empty() {
        return Err(ServerError::BadRequest("pipeline name must not be empty".into()));
    }
    // Reject documents that would fail at run time.
    Pipeline::parse(&request.pipeline)?;

    let mut registry = state.lock_registry()?;
    let id = registry.save(&request.name, request.pipeline)?;
    Ok(Json(SavePipelineResponse {
        id: id.to_string(),
        name: request.name,
    }))
}

#[derive(Debug, Deserialize)]
struct GetPipelineQuery {
    name: String,
}

/// Fetch a stored pipeline document by exact name.
async fn get_pipeline(
    State(state): State<AppState>,
    Query(query): Query<GetPipelineQuery>,
) -> Result<Json<Value>, ServerError> {
    let registry = state.lock_registry()?;
    let doc = registry.get(&query.name)?;
    let body = serde_json::to_value(doc)
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(Json(body))
}
