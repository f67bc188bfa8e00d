//! Transfer pipeline: download → classify → [normalize] → upload → interpret → cleanup.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use reqwest::Url;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::artifact::{ArtifactSet, DEFAULT_PREFIX};
use crate::classify::{
    classify, has_extension, is_webp_signature, needs_normalization, NORMALIZED_EXTENSION,
    WEBP_EXTENSION,
};
use crate::config::{parse_http_url, EncoderKind, RelayConfig};
use crate::encoder::{CommandEncoder, ImageEncoder, NativeEncoder};
use crate::error::{LogLevel, TransferError, TransferResult};
use crate::interpret::interpret;
use crate::transport::{self, Transport};

/// A validated request to re-host one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    source_url: Url,
    filename_prefix: String,
}

impl TransferRequest {
    /// Validate caller input. Nothing is fetched here.
    pub fn new(source_url: Option<&str>, filename_prefix: Option<&str>) -> TransferResult<Self> {
        let source_url = source_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TransferError::Validation("image_url is required".to_string()))?;
        let source_url = parse_http_url(source_url)?;

        let filename_prefix = filename_prefix
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_PREFIX)
            .to_string();

        Ok(Self {
            source_url,
            filename_prefix,
        })
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn filename_prefix(&self) -> &str {
        &self.filename_prefix
    }
}

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub raw_response: String,
    pub resolved_url: Option<String>,
    pub converted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    PartialSuccessUnknownUrl,
}

impl UploadOutcome {
    pub fn status(&self) -> OutcomeStatus {
        if self.resolved_url.is_some() {
            OutcomeStatus::Success
        } else {
            OutcomeStatus::PartialSuccessUnknownUrl
        }
    }
}

pub type PipelineResult = Result<UploadOutcome, TransferError>;

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Downloading,
    ClassifyingFormat,
    Converting,
    Uploading,
    Interpreting,
    Cleaning,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Downloading => "downloading",
            Stage::ClassifyingFormat => "classifying_format",
            Stage::Converting => "converting",
            Stage::Uploading => "uploading",
            Stage::Interpreting => "interpreting",
            Stage::Cleaning => "cleaning",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Sequences one transfer and owns its temporary artifacts.
#[derive(Clone)]
pub struct TransferPipeline {
    config: Arc<RelayConfig>,
    transport: Arc<dyn Transport>,
    encoder: Arc<dyn ImageEncoder>,
}

impl fmt::Debug for TransferPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransferPipeline {
    pub fn new(
        config: RelayConfig,
        transport: Arc<dyn Transport>,
        encoder: Arc<dyn ImageEncoder>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            encoder,
        }
    }

    /// Build the transport and encoder named by the configuration.
    pub fn from_config(config: RelayConfig) -> TransferResult<Self> {
        let transport = transport::from_config(&config)?;
        let encoder: Arc<dyn ImageEncoder> = match config.encoder {
            EncoderKind::Command => Arc::new(CommandEncoder::new(config.convert_path.clone())),
            EncoderKind::Native => Arc::new(NativeEncoder::new(config.jpeg_quality)),
        };
        Ok(Self::new(config, transport, encoder))
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Run one request through every stage. Artifacts are always removed
    /// before this returns.
    #[tracing::instrument(
        skip(self, request),
        fields(source_url = %request.source_url(), operation = "upload_image_from_url")
    )]
    pub async fn run(&self, request: &TransferRequest) -> PipelineResult {
        let mut artifacts = ArtifactSet::new(&self.config.temp_dir, request.filename_prefix());
        let mut stage = Stage::Idle;

        let result = self.execute(request, &mut artifacts, &mut stage).await;

        if let Err(e) = &result {
            match e.log_level() {
                LogLevel::Debug => tracing::debug!(stage = %stage, error = %e, "Transfer failed"),
                LogLevel::Warn => tracing::warn!(stage = %stage, error = %e, "Transfer failed"),
                LogLevel::Error => tracing::error!(stage = %stage, error = %e, "Transfer failed"),
            }
        }

        tracing::debug!(stage = %Stage::Cleaning, artifacts = artifacts.len(), "Releasing temporary artifacts");
        artifacts.release().await;

        if let Ok(outcome) = &result {
            tracing::info!(
                stage = %Stage::Done,
                converted = outcome.converted,
                resolved_url = ?outcome.resolved_url,
                "Transfer complete"
            );
        }
        result
    }

    async fn execute(
        &self,
        request: &TransferRequest,
        artifacts: &mut ArtifactSet,
        stage: &mut Stage,
    ) -> PipelineResult {
        let source_url = request.source_url();

        *stage = Stage::Downloading;
        let extension = classify(source_url.as_str());
        let fetched = artifacts.create(&extension)?;
        tracing::info!(url = %source_url, path = %fetched.display(), "Downloading source image");
        self.transport.fetch(source_url, &fetched).await?;

        *stage = Stage::ClassifyingFormat;
        let is_webp = if needs_normalization(&extension) {
            true
        } else if !has_extension(source_url.as_str()) {
            sniff_webp(&fetched).await?
        } else {
            false
        };
        tracing::debug!(extension = %extension, is_webp, "Classified source format");

        let (upload_path, converted) = if is_webp {
            *stage = Stage::Converting;
            let target = artifacts.create(NORMALIZED_EXTENSION)?;
            tracing::info!(from = WEBP_EXTENSION, to = NORMALIZED_EXTENSION, "Normalizing image");
            self.encoder.reencode(&fetched, &target).await?;
            (target, true)
        } else {
            (fetched, false)
        };

        *stage = Stage::Uploading;
        let endpoint = &self.config.upload_url;
        tracing::info!(endpoint = %endpoint, path = %upload_path.display(), "Uploading image");
        let raw_response = self.transport.upload(&upload_path, endpoint).await?;

        *stage = Stage::Interpreting;
        let resolved_url = interpret(&raw_response, endpoint.as_str());
        if resolved_url.is_none() {
            tracing::warn!("Upload succeeded but no image URL could be resolved from the response");
        }

        Ok(UploadOutcome {
            raw_response,
            resolved_url,
            converted,
        })
    }
}

/// Inspect the leading bytes of a downloaded file for a WebP signature.
async fn sniff_webp(path: &Path) -> TransferResult<bool> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut header = [0u8; 12];
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(is_webp_signature(&header[..filled]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_requires_image_url() {
        for input in [None, Some(""), Some("   ")] {
            let err = TransferRequest::new(input, None).unwrap_err();
            assert!(matches!(err, TransferError::Validation(_)));
        }
    }

    #[test]
    fn test_request_rejects_non_http_urls() {
        let err = TransferRequest::new(Some("file:///etc/passwd"), None).unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
    }

    #[test]
    fn test_request_default_prefix() {
        let request = TransferRequest::new(Some(" https://host/a.webp "), None).unwrap();
        assert_eq!(request.source_url().as_str(), "https://host/a.webp");
        assert_eq!(request.filename_prefix(), DEFAULT_PREFIX);

        let request = TransferRequest::new(Some("https://host/a.webp"), Some("")).unwrap();
        assert_eq!(request.filename_prefix(), DEFAULT_PREFIX);

        let request = TransferRequest::new(Some("https://host/a.webp"), Some("cat_")).unwrap();
        assert_eq!(request.filename_prefix(), "cat_");
    }

    #[test]
    fn test_outcome_status() {
        let mut outcome = UploadOutcome {
            raw_response: "not valid json".to_string(),
            resolved_url: None,
            converted: false,
        };
        assert_eq!(outcome.status(), OutcomeStatus::PartialSuccessUnknownUrl);
        outcome.resolved_url = Some("https://img.host/x.jpg".to_string());
        assert_eq!(outcome.status(), OutcomeStatus::Success);
        assert_eq!(
            serde_json::to_value(OutcomeStatus::PartialSuccessUnknownUrl).unwrap(),
            "partial_success_unknown_url"
        );
    }

    #[tokio::test]
    async fn test_sniff_webp() {
        let dir = tempfile::tempdir().unwrap();
        let webp = dir.path().join("a");
        let short = dir.path().join("b");
        tokio::fs::write(&webp, b"RIFF\x10\x00\x00\x00WEBPVP8L....").await.unwrap();
        tokio::fs::write(&short, b"RIF").await.unwrap();
        assert!(sniff_webp(&webp).await.unwrap());
        assert!(!sniff_webp(&short).await.unwrap());
    }
}
