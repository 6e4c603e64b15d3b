use std::{path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::{
    download::{DownloadKind, DownloadTarget},
    error::{ApiError, DOWNLOAD_FAILED_MESSAGE, INFO_FAILED_MESSAGE},
    extractor::MediaExtractor,
    metadata::TikTokData,
    validator::validate_tiktok_url,
};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn MediaExtractor>,
    pub temp_dir: PathBuf,
}

impl AppState {
    pub fn new(extractor: Arc<dyn MediaExtractor>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            temp_dir: temp_dir.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InfoRequest {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    url: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/tiktok/info", post(tiktok_info))
        .route("/api/tiktok/download/{kind}", get(tiktok_download))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn tiktok_info(
    State(state): State<AppState>,
    payload: Result<Json<InfoRequest>, JsonRejection>,
) -> Result<Json<TikTokData>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let url = validate_tiktok_url(payload.url.trim())?;

    let info = state.extractor.dump_info(url).await.map_err(|error| {
        error!("Error getting video info for {url:?}: {error}");
        ApiError::internal(INFO_FAILED_MESSAGE)
    })?;

    Ok(Json(TikTokData::from_info(url, info)))
}

async fn tiktok_download(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let url = query
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::bad_request("URL is required"))?;
    let kind: DownloadKind = kind
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Unsupported download type: {kind}")))?;
    let url = validate_tiktok_url(url)?;

    let failed = |context: &str, detail: &dyn std::fmt::Display| {
        error!("Download error ({kind}) for {url:?}: {context}: {detail}");
        ApiError::internal(DOWNLOAD_FAILED_MESSAGE)
    };

    tokio::fs::create_dir_all(&state.temp_dir)
        .await
        .map_err(|error| failed("creating temp dir", &error))?;

    let target = DownloadTarget::reserve(&state.temp_dir, kind, Utc::now())
        .await
        .map_err(|error| failed("reserving output file", &error))?;
    state
        .extractor
        .download(url, &target)
        .await
        .map_err(|error| failed("extractor", &error))?;

    let file = tokio::fs::File::open(&target.path)
        .await
        .map_err(|error| failed("opening output", &error))?;
    let content_length = file
        .metadata()
        .await
        .map_err(|error| failed("reading output metadata", &error))?
        .len();

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(kind.content_type()));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&target.content_disposition())
            .map_err(|error| failed("building content disposition", &error))?,
    );

    info!(
        "Streaming {} ({content_length} bytes) for {url:?}",
        target.file_name
    );
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
