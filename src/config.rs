use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};

use axum::http::{HeaderValue, Method, header::CONTENT_DISPOSITION};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_TEMP_DIR: &str = "temp";
const DEFAULT_YT_DLP_PATH: &str = "yt-dlp";
const DEFAULT_YT_DLP_TIMEOUT_SECONDS: u64 = 180;
const DEV_ORIGINS: [&str; 2] = ["http://127.0.0.1:5173", "http://localhost:5173"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid origin in ALLOWED_ORIGINS: {0}. Use values like https://example.com")]
    InvalidOrigin(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub temp_dir: PathBuf,
    pub yt_dlp_path: String,
    pub yt_dlp_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).and_then(|value| non_empty(&value));

        let bind_addr = read("APP_ADDR")
            .or_else(|| {
                read("PORT")
                    .and_then(|port| port.parse::<u16>().ok())
                    .map(|port| format!("0.0.0.0:{port}"))
            })
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let allowed_origins = read("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let yt_dlp_timeout = read("YT_DLP_TIMEOUT_SECONDS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|seconds| *seconds > 0)
            .unwrap_or(DEFAULT_YT_DLP_TIMEOUT_SECONDS);

        Self {
            bind_addr,
            allowed_origins,
            temp_dir: PathBuf::from(read("TEMP_DIR").unwrap_or_else(|| DEFAULT_TEMP_DIR.into())),
            yt_dlp_path: read("YT_DLP_PATH").unwrap_or_else(|| DEFAULT_YT_DLP_PATH.into()),
            yt_dlp_timeout: Duration::from_secs(yt_dlp_timeout),
        }
    }

    pub fn cors_layer(&self) -> Result<CorsLayer, ConfigError> {
        let origins: Vec<String> = if self.allowed_origins.is_empty() {
            warn!("ALLOWED_ORIGINS is not set, falling back to development origins");
            DEV_ORIGINS.iter().map(ToString::to_string).collect()
        } else {
            self.allowed_origins.clone()
        };

        let normalized_origins = origins
            .iter()
            .map(|origin| {
                normalize_origin(origin).ok_or_else(|| ConfigError::InvalidOrigin(origin.clone()))
            })
            .collect::<Result<HashSet<_>, _>>()?;
        info!(
            "CORS allow-list loaded with {} origin(s): {:?}",
            normalized_origins.len(),
            normalized_origins
        );

        let allowed_origins = Arc::new(normalized_origins);
        let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!("CORS origin {:?} allowed={}", origin, allowed);
            allowed
        });

        Ok(CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
            .expose_headers([CONTENT_DISPOSITION]))
    }
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    if !matches!(scheme, "http" | "https") {
        return None;
    }
    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    // `Url::port` is already `None` for the scheme's default port.
    match parsed.port() {
        Some(port) => Some(format!("{scheme}://{host}:{port}")),
        None => Some(format!("{scheme}://{host}")),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
