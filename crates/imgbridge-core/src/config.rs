//! Configuration module
//!
//! The relay is configured once at startup from environment variables. The
//! resulting [`RelayConfig`] is immutable and shared by every request.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::error::{TransferError, TransferResult};

pub const UPLOAD_URL_ENV: &str = "IMGBRIDGE_UPLOAD_URL";
pub const UPLOAD_URL_FALLBACK_ENV: &str = "UPLOAD_URL";

const FETCH_TIMEOUT_SECS: u64 = 15;
const UPLOAD_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 5;
const JPEG_QUALITY: u8 = 90;
const CONVERT_PATH: &str = "convert";
const CURL_PATH: &str = "curl";

/// Which transport moves bytes to and from the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// In-process HTTP client.
    Native,
    /// Shells out to `curl`.
    Curl,
}

impl FromStr for TransportKind {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native" | "http" => Ok(TransportKind::Native),
            "curl" => Ok(TransportKind::Curl),
            other => Err(TransferError::Validation(format!(
                "Unknown transport '{}': expected 'native' or 'curl'",
                other
            ))),
        }
    }
}

/// Which encoder performs WebP normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderKind {
    /// External conversion utility (ImageMagick `convert` by default).
    Command,
    /// In-process codec.
    Native,
}

impl FromStr for EncoderKind {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "command" | "external" => Ok(EncoderKind::Command),
            "native" => Ok(EncoderKind::Native),
            other => Err(TransferError::Validation(format!(
                "Unknown encoder '{}': expected 'command' or 'native'",
                other
            ))),
        }
    }
}

/// Process-wide relay configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub upload_url: Url,
    pub fetch_timeout: Duration,
    pub upload_timeout: Duration,
    pub max_redirects: usize,
    pub temp_dir: PathBuf,
    pub transport: TransportKind,
    pub encoder: EncoderKind,
    pub convert_path: String,
    pub curl_path: String,
    pub jpeg_quality: u8,
}

impl RelayConfig {
    /// Configuration with defaults for everything but the upload endpoint.
    pub fn new(upload_url: Url) -> Self {
        Self {
            upload_url,
            fetch_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(UPLOAD_TIMEOUT_SECS),
            max_redirects: MAX_REDIRECTS,
            temp_dir: env::temp_dir(),
            transport: TransportKind::Native,
            encoder: EncoderKind::Command,
            convert_path: CONVERT_PATH.to_string(),
            curl_path: CURL_PATH.to_string(),
            jpeg_quality: JPEG_QUALITY,
        }
    }

    /// Load from the process environment. Missing upload endpoint is an error.
    pub fn from_env() -> TransferResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> TransferResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let raw_url = get(UPLOAD_URL_ENV)
            .or_else(|| get(UPLOAD_URL_FALLBACK_ENV))
            .ok_or_else(|| {
                TransferError::Validation(format!(
                    "Missing upload endpoint. Set {} or {}",
                    UPLOAD_URL_ENV, UPLOAD_URL_FALLBACK_ENV
                ))
            })?;
        let upload_url = parse_http_url(raw_url.trim())?;

        let mut config = Self::new(upload_url);

        if let Some(v) = get("IMGBRIDGE_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout = parse_timeout("IMGBRIDGE_FETCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("IMGBRIDGE_UPLOAD_TIMEOUT_SECS") {
            config.upload_timeout = parse_timeout("IMGBRIDGE_UPLOAD_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("IMGBRIDGE_MAX_REDIRECTS") {
            config.max_redirects = parse_var("IMGBRIDGE_MAX_REDIRECTS", &v)?;
        }
        if let Some(v) = get("IMGBRIDGE_TEMP_DIR") {
            config.temp_dir = PathBuf::from(v);
        }
        if let Some(v) = get("IMGBRIDGE_TRANSPORT") {
            config.transport = v.parse()?;
        }
        if let Some(v) = get("IMGBRIDGE_ENCODER") {
            config.encoder = v.parse()?;
        }
        if let Some(v) = get("IMGBRIDGE_CONVERT_PATH") {
            config.convert_path = v;
        }
        if let Some(v) = get("IMGBRIDGE_CURL_PATH") {
            config.curl_path = v;
        }
        if let Some(v) = get("IMGBRIDGE_JPEG_QUALITY") {
            let quality: u8 = parse_var("IMGBRIDGE_JPEG_QUALITY", &v)?;
            if quality == 0 || quality > 100 {
                return Err(TransferError::Validation(format!(
                    "IMGBRIDGE_JPEG_QUALITY must be between 1 and 100, got {}",
                    quality
                )));
            }
            config.jpeg_quality = quality;
        }

        Ok(config)
    }
}

/// Parse an absolute http(s) URL.
pub fn parse_http_url(raw: &str) -> TransferResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| TransferError::Validation(format!("Invalid URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(TransferError::Validation(format!(
            "Only HTTP and HTTPS URLs are allowed, got '{}'",
            scheme
        ))),
    }
}

/// Whole seconds, at least one. curl reads `--max-time 0` as "no limit".
fn parse_timeout(key: &str, value: &str) -> TransferResult<Duration> {
    match parse_var::<u64>(key, value)? {
        0 => Err(TransferError::Validation(format!(
            "{} must be at least 1 second",
            key
        ))),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> TransferResult<T> {
    value.trim().parse::<T>().map_err(|_| {
        TransferError::Validation(format!("Invalid value for {}: '{}'", key, value))
    })
}
