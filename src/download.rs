use std::{
    fmt,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{DateTime, TimeDelta, Utc};

const MAX_RESERVE_ATTEMPTS: i64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    Video,
    Audio,
}

impl DownloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadKind::Video => "video",
            DownloadKind::Audio => "audio",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DownloadKind::Video => "mp4",
            DownloadKind::Audio => "mp3",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            DownloadKind::Video => "video/mp4",
            DownloadKind::Audio => "audio/mpeg",
        }
    }

    /// Format selection passed to yt-dlp ahead of `-o <file> <url>`.
    pub fn yt_dlp_options(self) -> &'static [&'static str] {
        match self {
            DownloadKind::Video => &["--format", "best[ext=mp4]", "--force-overwrites"],
            DownloadKind::Audio => &[
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--force-overwrites",
            ],
        }
    }

    /// `tiktok-<kind>-<unix millis>.<ext>`
    pub fn file_name(self, created_at: DateTime<Utc>) -> String {
        format!(
            "tiktok-{}-{}.{}",
            self.as_str(),
            created_at.timestamp_millis(),
            self.extension()
        )
    }

    pub fn download_path(self, url: &str) -> String {
        format!(
            "/api/tiktok/download/{}?url={}",
            self.as_str(),
            urlencoding::encode(url)
        )
    }
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownDownloadKind;

impl FromStr for DownloadKind {
    type Err = UnknownDownloadKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "video" => Ok(DownloadKind::Video),
            "audio" => Ok(DownloadKind::Audio),
            _ => Err(UnknownDownloadKind),
        }
    }
}

/// A file the extractor is asked to produce.
#[derive(Debug, Clone)]
pub struct DownloadTarget {
    pub kind: DownloadKind,
    pub file_name: String,
    pub path: PathBuf,
}

impl DownloadTarget {
    pub fn new(temp_dir: &Path, kind: DownloadKind, created_at: DateTime<Utc>) -> Self {
        let file_name = kind.file_name(created_at);
        let path = temp_dir.join(&file_name);
        Self {
            kind,
            file_name,
            path,
        }
    }

    /// Claims a fresh name by creating the file exclusively, moving the
    /// timestamp forward a millisecond while the name is taken.
    pub async fn reserve(
        temp_dir: &Path,
        kind: DownloadKind,
        created_at: DateTime<Utc>,
    ) -> io::Result<Self> {
        for offset in 0..MAX_RESERVE_ATTEMPTS {
            let target = Self::new(temp_dir, kind, created_at + TimeDelta::milliseconds(offset));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target.path)
                .await
            {
                Ok(_) => return Ok(target),
                Err(error) if error.kind() == ErrorKind::AlreadyExists => continue,
                Err(error) => return Err(error),
            }
        }

        Err(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free {kind} file name near {}", created_at.timestamp_millis()),
        ))
    }

    pub fn content_disposition(&self) -> String {
        build_content_disposition(&self.file_name)
    }
}

pub fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_') {
                character
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "download.bin".to_string()
    } else {
        sanitized
    }
}
