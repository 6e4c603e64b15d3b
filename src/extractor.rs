use std::{io::ErrorKind, path::PathBuf, process::Output, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{process::Command, time::timeout};
use tracing::{debug, info, warn};

use crate::{download::DownloadTarget, metadata::YtDlpVideoInfo};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{program} is not installed or not on PATH")]
    NotInstalled { program: String },
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {limit:?}")]
    TimedOut { program: String, limit: Duration },
    #[error("{program} exited with {status}: {message}")]
    Failed {
        program: String,
        status: String,
        message: String,
    },
    #[error("could not parse metadata JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("expected output file {0:?} was not produced")]
    MissingOutput(PathBuf),
}

/// The external media tool. Handlers only talk to this seam so the HTTP
/// layer can run without a real `yt-dlp` binary.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Dump metadata for `url` without downloading anything.
    async fn dump_info(&self, url: &str) -> Result<YtDlpVideoInfo, ExtractError>;

    /// Download `url` into `target.path`, transcoding as `target.kind` requires.
    async fn download(&self, url: &str, target: &DownloadTarget) -> Result<(), ExtractError>;
}

pub struct YtDlp {
    program: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub async fn probe(&self) -> bool {
        match self.run(vec!["--version".to_string()]).await {
            Ok(output) => {
                info!(
                    "{} available, version {}",
                    self.program,
                    String::from_utf8_lossy(&output.stdout).trim()
                );
                true
            }
            Err(error) => {
                warn!("{error}; info and download requests will fail");
                false
            }
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<Output, ExtractError> {
        debug!("running {} {:?}", self.program, args);

        let command_future = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output();
        let output = timeout(self.timeout, command_future)
            .await
            .map_err(|_| ExtractError::TimedOut {
                program: self.program.clone(),
                limit: self.timeout,
            })?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ExtractError::NotInstalled {
                        program: self.program.clone(),
                    }
                } else {
                    ExtractError::Spawn {
                        program: self.program.clone(),
                        source: error,
                    }
                }
            })?;

        if !output.status.success() {
            for line in String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
            {
                warn!("{} stderr: {line}", self.program);
            }
            return Err(ExtractError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                message: last_stderr_line(&output.stderr),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    async fn dump_info(&self, url: &str) -> Result<YtDlpVideoInfo, ExtractError> {
        let output = self
            .run(vec![
                "--dump-json".to_string(),
                "--no-playlist".to_string(),
                "--no-warnings".to_string(),
                url.to_string(),
            ])
            .await?;

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn download(&self, url: &str, target: &DownloadTarget) -> Result<(), ExtractError> {
        let mut args: Vec<String> = target
            .kind
            .yt_dlp_options()
            .iter()
            .map(ToString::to_string)
            .collect();
        args.extend([
            "--no-playlist".to_string(),
            "-o".to_string(),
            target.path.to_string_lossy().into_owned(),
            url.to_string(),
        ]);

        self.run(args).await?;

        match tokio::fs::metadata(&target.path).await {
            Ok(metadata) if metadata.is_file() && metadata.len() > 0 => Ok(()),
            _ => Err(ExtractError::MissingOutput(target.path.clone())),
        }
    }
}

fn last_stderr_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("no error output")
        .to_string()
}
