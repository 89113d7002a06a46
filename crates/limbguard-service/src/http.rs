//! HTTP surface for the assessment pipeline.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    routing::{get, post},
};
use limbguard_core::{AssessmentResponse, Settings};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::assessor::Assessor;
use crate::capabilities::{ClassifierMode, RetrievalMode};
use crate::error::{ApiError, ApiResult};

/// Multipart field carrying the uploaded image.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub classifier: ClassifierMode,
    pub retrieval: RetrievalMode,
    pub demo_mode: bool,
    pub version: &'static str,
}

pub fn router(assessor: Arc<Assessor>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/demo", get(demo))
        .route("/status", get(status))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(assessor)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(assessor: Arc<Assessor>, settings: &Settings) -> anyhow::Result<()> {
    let app = router(assessor, settings.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&settings.bind).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("received shutdown signal");
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "message": "LimbGuard API is running"}))
}

async fn demo(State(assessor): State<Arc<Assessor>>) -> Json<Value> {
    Json(json!({"demo_mode": assessor.demo_mode()}))
}

async fn status(State(assessor): State<Arc<Assessor>>) -> Json<StatusResponse> {
    let caps = assessor.capabilities();
    Json(StatusResponse {
        classifier: caps.classifier,
        retrieval: caps.retrieval,
        demo_mode: caps.demo_mode(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /predict - assess one uploaded foot image
async fn predict(
    State(assessor): State<Arc<Assessor>>,
    mut multipart: Multipart,
) -> ApiResult<Json<AssessmentResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let is_image = field
            .content_type()
            .is_some_and(|ct| ct.starts_with("image/"));
        if !is_image {
            return Err(ApiError::bad_request("File must be an image", "NOT_AN_IMAGE"));
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(malformed)?;
        debug!(filename, bytes = bytes.len(), "received upload");

        let response = assessor.assess(bytes.to_vec(), &filename).await?;
        return Ok(Json(response));
    }

    Err(ApiError::validation(format!("missing `{FILE_FIELD}` field")))
}

fn malformed(err: MultipartError) -> ApiError {
    ApiError::with_code(err.status(), err.body_text(), "MALFORMED_UPLOAD")
}
