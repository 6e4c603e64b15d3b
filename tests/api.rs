use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{
        Request, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, ORIGIN,
        },
    },
    response::Response,
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tiktok_downloader::{
    AppState, Config,
    download::DownloadTarget,
    extractor::{ExtractError, MediaExtractor},
    metadata::{TikTokData, YtDlpVideoInfo},
    router,
};
use tower::ServiceExt;

const TIKTOK_URL: &str = "https://www.tiktok.com/@scout2015/video/6718335390845095173";
const MEDIA_BYTES: &[u8] = b"not really an mp4";

#[derive(Default)]
struct FakeExtractor {
    fail: bool,
    info_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl FakeExtractor {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst) + self.download_calls.load(Ordering::SeqCst)
    }

    fn failure() -> ExtractError {
        ExtractError::Failed {
            program: "yt-dlp".to_string(),
            status: "exit status: 1".to_string(),
            message: "ERROR: Unable to extract".to_string(),
        }
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    async fn dump_info(&self, _url: &str) -> Result<YtDlpVideoInfo, ExtractError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Self::failure());
        }
        Ok(serde_json::from_value(serde_json::json!({
            "title": "Scramble up ur name",
            "thumbnail": "https://p16-sign.tiktokcdn.com/cover.jpeg",
            "duration": 45,
            "width": 576,
            "height": 1024,
            "vcodec": "h264",
            "fps": 30,
            "tbr": 2048.0,
            "filesize": 3_145_728,
        }))?)
    }

    async fn download(&self, _url: &str, target: &DownloadTarget) -> Result<(), ExtractError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Self::failure());
        }
        tokio::fs::write(&target.path, MEDIA_BYTES)
            .await
            .map_err(|source| ExtractError::Spawn {
                program: "fake".to_string(),
                source,
            })
    }
}

struct Harness {
    app: Router,
    extractor: Arc<FakeExtractor>,
    temp: TempDir,
}

impl Harness {
    fn new(extractor: FakeExtractor) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let extractor = Arc::new(extractor);
        let state = AppState::new(extractor.clone(), temp.path().join("temp"));
        Self {
            app: router(state),
            extractor,
            temp,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn info(&self, body: &str) -> Response {
        self.send(
            Request::post("/api/tiktok/info")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn download(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }
}

fn download_uri(kind: &str, url: &str) -> String {
    format!(
        "/api/tiktok/download/{kind}?url={}",
        urlencoding::encode(url)
    )
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn info_returns_populated_metadata() {
    let harness = Harness::new(FakeExtractor::default());
    let body = serde_json::json!({ "url": TIKTOK_URL }).to_string();

    let response = harness.info(&body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let data: TikTokData = serde_json::from_value(body_json(response).await).unwrap();
    let encoded = urlencoding::encode(TIKTOK_URL);
    assert_eq!(
        data.video_url,
        format!("/api/tiktok/download/video?url={encoded}")
    );
    assert_eq!(
        data.audio_url,
        format!("/api/tiktok/download/audio?url={encoded}")
    );
    assert_eq!(data.title, "Scramble up ur name");
    assert_eq!(data.metadata.duration, "0:45");
    assert_eq!(data.metadata.video_size, "3.0 MB");
    assert_eq!(data.metadata.resolution, "576x1024");
    assert_eq!(data.metadata.bitrate, "2.0 Mbps");

    let metadata = &data.metadata;
    for field in [
        &metadata.duration,
        &metadata.video_size,
        &metadata.audio_size,
        &metadata.resolution,
        &metadata.format,
        &metadata.codec,
        &metadata.fps,
        &metadata.bitrate,
    ] {
        assert!(!field.is_empty());
    }
    assert_eq!(harness.extractor.info_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn info_rejects_invalid_url_without_calling_extractor() {
    let harness = Harness::new(FakeExtractor::default());

    for url in ["", "https://youtube.com/watch?v=1", "tiktok"] {
        let body = serde_json::json!({ "url": url }).to_string();
        let response = harness.info(&body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{url}");

        let json = body_json(response).await;
        let message = json["message"].as_str().unwrap_or_default();
        assert!(!message.is_empty());
    }

    assert_eq!(harness.extractor.calls(), 0);
}

#[tokio::test]
async fn info_rejects_unreadable_body() {
    let harness = Harness::new(FakeExtractor::default());

    let response = harness.info("{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["message"].is_string());

    let response = harness.info("{}").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Please enter a TikTok URL"
    );

    assert_eq!(harness.extractor.calls(), 0);
}

#[tokio::test]
async fn info_reports_extractor_failure_as_server_error() {
    let harness = Harness::new(FakeExtractor::failing());
    let body = serde_json::json!({ "url": TIKTOK_URL }).to_string();

    let response = harness.info(&body).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["message"],
        "Failed to process TikTok URL"
    );
}

#[tokio::test]
async fn download_requires_url() {
    let harness = Harness::new(FakeExtractor::default());

    for uri in [
        "/api/tiktok/download/video",
        "/api/tiktok/download/audio?url=",
        "/api/tiktok/download/video?url=%20%20",
    ] {
        let response = harness.download(uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body_json(response).await["message"], "URL is required");
    }

    assert_eq!(harness.extractor.calls(), 0);
}

#[tokio::test]
async fn download_rejects_unknown_type_and_foreign_urls() {
    let harness = Harness::new(FakeExtractor::default());

    let response = harness.download(&download_uri("gif", TIKTOK_URL)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = harness
        .download(&download_uri("video", "https://example.com/clip.mp4"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(harness.extractor.calls(), 0);
}

#[tokio::test]
async fn download_streams_video() {
    let harness = Harness::new(FakeExtractor::default());

    let response = harness.download(&download_uri("video", TIKTOK_URL)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers[CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[CONTENT_LENGTH], MEDIA_BYTES.len().to_string().as_str());
    let disposition = headers[CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"tiktok-video-"));
    assert!(disposition.contains(".mp4"));

    assert_eq!(body_bytes(response).await, MEDIA_BYTES);
    assert_eq!(harness.extractor.download_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn download_streams_audio_and_keeps_temp_file() {
    let harness = Harness::new(FakeExtractor::default());

    let response = harness.download(&download_uri("audio", TIKTOK_URL)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "audio/mpeg");
    let disposition = response.headers()[CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.contains("tiktok-audio-"));
    assert!(disposition.contains(".mp3"));
    assert_eq!(body_bytes(response).await, MEDIA_BYTES);

    let produced: Vec<_> = std::fs::read_dir(harness.temp.path().join("temp"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(produced.len(), 1);
    assert!(produced[0].starts_with("tiktok-audio-"));
}

#[tokio::test]
async fn download_reports_extractor_failure_without_body() {
    let harness = Harness::new(FakeExtractor::failing());

    for kind in ["video", "audio"] {
        let response = harness.download(&download_uri(kind, TIKTOK_URL)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            body_json(response).await["message"],
            "Failed to download content"
        );
    }
    assert_eq!(harness.extractor.download_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn serves_page_and_health() {
    let harness = Harness::new(FakeExtractor::default());

    let response = harness.download("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(page.contains("/api/tiktok/info"));

    let response = harness.download("/api/health").await;
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn cors_allows_only_listed_origins() {
    let harness = Harness::new(FakeExtractor::default());
    let config = Config {
        bind_addr: "127.0.0.1:0".to_string(),
        allowed_origins: Vec::new(),
        temp_dir: harness.temp.path().join("temp"),
        yt_dlp_path: "yt-dlp".to_string(),
        yt_dlp_timeout: Duration::from_secs(5),
    };
    let app = harness.app.clone().layer(config.cors_layer().unwrap());

    let with_origin = |origin: &str| {
        Request::get("/api/health")
            .header(ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(with_origin("http://localhost:5173"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );

    let response = app
        .oneshot(with_origin("https://evil.example"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn repeated_downloads_get_their_own_files() {
    let harness = Harness::new(FakeExtractor::default());

    let first_uri = download_uri("video", TIKTOK_URL);
    let second_uri = download_uri("video", TIKTOK_URL);
    let (first, second) = tokio::join!(
        harness.download(&first_uri),
        harness.download(&second_uri),
    );
    let first_name = first.headers()[CONTENT_DISPOSITION].to_str().unwrap().to_string();
    let second_name = second.headers()[CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert_ne!(first_name, second_name);

    let produced = std::fs::read_dir(harness.temp.path().join("temp"))
        .unwrap()
        .count();
    assert_eq!(produced, 2);
}
