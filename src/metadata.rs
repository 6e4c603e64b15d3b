use serde::{Deserialize, Serialize};

use crate::download::DownloadKind;

pub const PLACEHOLDER_THUMBNAIL: &str = "https://picsum.photos/seed/1/1280/720";
pub const DEFAULT_TITLE: &str = "TikTok Video";
pub const DEFAULT_CODEC: &str = "H.264";
pub const DEFAULT_FPS: u32 = 30;
pub const UNKNOWN: &str = "Unknown";
const VIDEO_FORMAT_LABEL: &str = "MP4";

/// Subset of `yt-dlp --dump-json` that the preview needs.
#[derive(Debug, Default, Deserialize)]
pub struct YtDlpVideoInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vcodec: Option<String>,
    pub fps: Option<f64>,
    pub tbr: Option<f64>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
    pub audio_filesize: Option<f64>,
    #[serde(default)]
    pub formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Default, Deserialize)]
pub struct YtDlpFormat {
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub abr: Option<f64>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

impl YtDlpFormat {
    fn is_audio_only(&self) -> bool {
        let has_audio = matches!(self.acodec.as_deref(), Some(value) if value != "none");
        let has_video = matches!(self.vcodec.as_deref(), Some(value) if value != "none");
        has_audio && !has_video
    }

    fn size(&self) -> Option<f64> {
        self.filesize.or(self.filesize_approx)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TikTokData {
    pub video_url: String,
    pub audio_url: String,
    pub thumbnail: String,
    pub title: String,
    pub metadata: TikTokMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TikTokMetadata {
    pub duration: String,
    pub video_size: String,
    pub audio_size: String,
    pub resolution: String,
    pub format: String,
    pub codec: String,
    pub fps: String,
    pub bitrate: String,
}

impl TikTokData {
    pub fn from_info(url: &str, info: YtDlpVideoInfo) -> Self {
        let metadata = TikTokMetadata {
            duration: info
                .duration
                .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
                .map(|seconds| format_duration(seconds.round() as u64))
                .unwrap_or_else(|| format_duration(0)),
            video_size: info
                .filesize
                .or(info.filesize_approx)
                .and_then(format_filesize_mb)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            audio_size: info
                .audio_filesize
                .or_else(|| best_audio_size(&info.formats))
                .and_then(format_filesize_mb)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            resolution: match (info.width, info.height) {
                (Some(width), Some(height)) if width > 0 && height > 0 => {
                    format!("{width}x{height}")
                }
                _ => UNKNOWN.to_string(),
            },
            format: VIDEO_FORMAT_LABEL.to_string(),
            codec: info
                .vcodec
                .as_deref()
                .and_then(non_empty)
                .filter(|codec| *codec != "none")
                .unwrap_or(DEFAULT_CODEC)
                .to_string(),
            fps: info
                .fps
                .filter(|fps| fps.is_finite() && *fps > 0.0)
                .map(|fps| (fps.round() as u32).to_string())
                .unwrap_or_else(|| DEFAULT_FPS.to_string()),
            bitrate: info
                .tbr
                .filter(|kbps| kbps.is_finite() && *kbps > 0.0)
                .map(format_bitrate_mbps)
                .unwrap_or_else(|| UNKNOWN.to_string()),
        };

        Self {
            video_url: DownloadKind::Video.download_path(url),
            audio_url: DownloadKind::Audio.download_path(url),
            thumbnail: info
                .thumbnail
                .as_deref()
                .and_then(non_empty)
                .unwrap_or(PLACEHOLDER_THUMBNAIL)
                .to_string(),
            title: info
                .title
                .as_deref()
                .and_then(non_empty)
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            metadata,
        }
    }
}

// Minutes are not padded and keep growing past an hour.
pub fn format_duration(total_seconds: u64) -> String {
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

fn format_filesize_mb(bytes: f64) -> Option<String> {
    if !bytes.is_finite() || bytes <= 0.0 {
        return None;
    }
    Some(format!("{:.1} MB", bytes / 1_048_576.0))
}

/// yt-dlp reports `tbr` in kbit/s.
fn format_bitrate_mbps(kbps: f64) -> String {
    format!("{:.1} Mbps", kbps / 1000.0)
}

fn best_audio_size(formats: &[YtDlpFormat]) -> Option<f64> {
    formats
        .iter()
        .filter(|format| format.is_audio_only())
        .filter_map(|format| format.size().map(|size| (format.abr.unwrap_or_default(), size)))
        .max_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)))
        .map(|(_, size)| size)
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
