use crate::{
    embedding::{EmbeddingStore, FaceMatch, SearchEngine, SearchError},
    ingest::Ingestor,
    media::MediaItem,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt::Debug, sync::Arc};
use tokio::{signal, sync::RwLock};

struct SharedState {
    ingestor: Arc<RwLock<Ingestor>>,
    engine: Arc<SearchEngine>,
    extractor: Arc<dyn crate::extract::FaceExtractor>,
    store: Arc<EmbeddingStore>,
}

pub fn start_daemon(
    ingestor: Ingestor,
    engine: Arc<SearchEngine>,
    extractor: Arc<dyn crate::extract::FaceExtractor>,
    store: Arc<EmbeddingStore>,
    uploads_dir: String,
    listen_addr: String,
) {
    let ingestor = Arc::new(RwLock::new(ingestor));
    let state = SharedState {
        ingestor,
        engine,
        extractor,
        store,
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { run(state, uploads_dir, listen_addr).await });
}

async fn run(state: SharedState, uploads_dir: String, listen_addr: String) {
    let signal = {
        let ingestor = state.ingestor.clone();
        async move {
            let ctrl_c = async {
                signal::ctrl_c()
                    .await
                    .expect("failed to install Ctrl+C handler");
            };

            let terminate = async {
                signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("failed to install signal handler")
                    .recv()
                    .await;
            };

            tokio::select! {
                _ = ctrl_c => {},
                _ = terminate => {},
            }

            let mut ingestor = ingestor.write().await;
            ingestor.shutdown();

            log::warn!("waiting for ingest queue to stop");
            ingestor.wait_queue_finish();
        }
    };

    let shared_state = Arc::new(state);

    let app = Router::new()
        .nest_service(
            "/api/file/",
            tower_http::services::ServeDir::new(uploads_dir),
        )
        .route("/api/media/upload", post(upload))
        .route("/api/media/search", post(search))
        .route("/api/media", get(list_media))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await.unwrap();
    log::info!("listening on {listen_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .unwrap();
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("Base64: {0:?}")]
    Base64(#[from] base64::DecodeError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

// Wrapper so `?` converts any of the above into a response.
#[derive(Debug)]
struct HttpError(ApiError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match &self.0 {
            ApiError::Search(SearchError::NoFaceDetected)
            | ApiError::Search(SearchError::NoMatches) => (
                axum::http::StatusCode::NOT_FOUND,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            ApiError::Search(SearchError::DegenerateQuery)
            | ApiError::Search(SearchError::Decode(_)) => (
                axum::http::StatusCode::BAD_REQUEST,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            ApiError::Base64(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            _ => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<ApiError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Deserialize, Serialize)]
pub struct UploadFile {
    pub filename: String,
    pub content_b64: String,
}

impl Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UploadFile {{ filename: {:?}, content_b64: [REDACTED] }}",
            self.filename
        )
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UploadRequest {
    pub files: Vec<UploadFile>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub media_ids: Vec<u64>,
}

async fn upload(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<UploadRequest>,
) -> Result<axum::Json<UploadResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let mut files = Vec::with_capacity(payload.files.len());
    for file in payload.files {
        let data = STANDARD.decode(file.content_b64)?;
        files.push((file.filename, data));
    }

    let ingestor = state.ingestor.clone();

    tokio::task::block_in_place(move || {
        let ingestor = ingestor.blocking_read();
        let media_ids = ingestor.submit(files).map_err(ApiError::Other)?;
        Ok(axum::Json(UploadResponse { media_ids }))
    })
}

#[derive(Deserialize, Serialize)]
pub struct SearchRequest {
    pub content_b64: String,
    /// Minimum cosine score; the configured default when absent.
    #[serde(default)]
    pub threshold: Option<f64>,
}

impl Debug for SearchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SearchRequest {{ content_b64: [REDACTED], threshold: {:?} }}",
            self.threshold
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub matches: Vec<FaceMatch>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<axum::Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let data = STANDARD.decode(payload.content_b64)?;
    let engine = state.engine.clone();
    let extractor = state.extractor.clone();

    tokio::task::block_in_place(move || {
        let matches = engine
            .search_image(extractor.as_ref(), &data, payload.threshold)
            .map_err(ApiError::Search)?;
        Ok(axum::Json(SearchResponse { matches }))
    })
}

async fn list_media(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Vec<MediaItem>>, HttpError> {
    Ok(axum::Json(state.store.media_all()))
}
