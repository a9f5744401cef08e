//! HTTP boundary: accepts an upload plus a JSON config and answers with the
//! encoded file.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::signal;

use crate::config::ServiceConfig;
use crate::error::OptimizeError;
use crate::job::{JobParts, CONFIG_FIELD, VIDEO_FIELD};
use crate::options::TranscodeConfig;
use crate::service::OptimizeService;

pub fn router(service: Arc<OptimizeService>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/optimize-video", post(optimize_video))
        .route("/api/command-preview", post(command_preview))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Binds `config.bind_addr` and serves until Ctrl-C or SIGTERM.
pub async fn serve(config: &ServiceConfig, service: Arc<OptimizeService>) -> std::io::Result<()> {
    let app = router(Arc::clone(&service), config.max_upload_bytes);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            service.shutdown();
        })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn optimize_video(
    State(service): State<Arc<OptimizeService>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut parts = JobParts::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(VIDEO_FIELD) => {
                parts.file_name = field.file_name().map(str::to_string);
                parts.video = Some(field.bytes().await?.to_vec());
            }
            Some(CONFIG_FIELD) => {
                parts.config_json = Some(field.text().await?);
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let optimized = service.optimize_parts(parts).await?;
    let disposition = format!("attachment; filename=\"{}\"", optimized.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, optimized.mime_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        optimized.bytes,
    )
        .into_response())
}

async fn command_preview(
    State(service): State<Arc<OptimizeService>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let config: TranscodeConfig = serde_json::from_slice(&body)
        .map_err(|e| OptimizeError::invalid(CONFIG_FIELD, format!("failed to parse config JSON: {}", e)))?;
    let command = service.preview(&config).await?;
    Ok(Json(json!({
        "command": command.to_string(),
        "args": command.args_lossy(),
    })))
}

pub enum ApiError {
    Optimize(OptimizeError),
    Upload(MultipartError),
}

impl From<OptimizeError> for ApiError {
    fn from(e: OptimizeError) -> Self {
        ApiError::Optimize(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Upload(e)
    }
}

pub fn status_for(e: &OptimizeError) -> StatusCode {
    match e {
        OptimizeError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        OptimizeError::TranscodeTimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        OptimizeError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        OptimizeError::BinaryNotFound { .. }
        | OptimizeError::BinaryNotExecutable { .. }
        | OptimizeError::TranscodeFailed { .. }
        | OptimizeError::OutputMissing { .. }
        | OptimizeError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Optimize(e) => {
                let status = status_for(&e);
                let mut error = json!({
                    "kind": e.kind(),
                    "message": e.to_string(),
                });
                if let OptimizeError::TranscodeFailed { details } = &e {
                    error["message"] = json!("Encoder failed to process the video");
                    error["details"] = json!(details);
                }
                (status, error)
            }
            ApiError::Upload(e) => {
                warn!("Rejected upload: {}", e);
                (
                    e.status(),
                    json!({
                        "kind": "invalid_input",
                        "message": e.body_text(),
                    }),
                )
            }
        };
        (status, Json(json!({ "error": body }))).into_response()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Shutdown signal (Ctrl-C) received"),
        _ = terminate => info!("Shutdown signal (SIGTERM) received"),
    }
}
