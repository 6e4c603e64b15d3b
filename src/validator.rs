use thiserror::Error;
use url::Url;

const TIKTOK_DOMAIN: &str = "tiktok.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a TikTok URL")]
    Empty,
    #[error("Please enter a valid TikTok URL")]
    Invalid,
}

/// Accepts `http(s)` URLs on `tiktok.com` or any of its subdomains
/// (`www.`, `m.`, `vm.`, `vt.`) that point at something past the root.
pub fn validate_tiktok_url(input: &str) -> Result<&str, ValidationError> {
    if input.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    let parsed = Url::parse(input).map_err(|_| ValidationError::Invalid)?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::Invalid);
    }

    let host = parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or(ValidationError::Invalid)?;
    let is_tiktok_host =
        host == TIKTOK_DOMAIN || host.ends_with(&format!(".{TIKTOK_DOMAIN}"));
    if !is_tiktok_host {
        return Err(ValidationError::Invalid);
    }

    if parsed.path().trim_matches('/').is_empty() {
        return Err(ValidationError::Invalid);
    }

    Ok(input)
}
