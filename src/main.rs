use std::{io, sync::Arc};

use thiserror::Error;
use tiktok_downloader::{AppState, Config, config::ConfigError, extractor::YtDlp, router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Error)]
enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not create temp dir {path}: {source}")]
    TempDir { path: String, source: io::Error },
    #[error("could not bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("HTTP server error: {0}")]
    Serve(io::Error),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tiktok_downloader=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServerError> {
    let config = Config::from_env();

    tokio::fs::create_dir_all(&config.temp_dir)
        .await
        .map_err(|source| ServerError::TempDir {
            path: config.temp_dir.display().to_string(),
            source,
        })?;

    let extractor = YtDlp::new(config.yt_dlp_path.clone(), config.yt_dlp_timeout);
    extractor.probe().await;

    let cors = config.cors_layer()?;
    let app = router(AppState::new(Arc::new(extractor), config.temp_dir.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;

    info!("Server ready at http://{}", config.bind_addr);

    axum::serve(listener, app).await.map_err(ServerError::Serve)
}
