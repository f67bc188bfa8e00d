//! MCP tool request and result types with JSON Schema for AI parameter generation

use imgbridge_core::{OutcomeStatus, TransferError, UploadOutcome};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UploadImageFromUrlRequest {
    // Required in the schema, but a missing value still deserializes to `None`
    // so it is reported as a failure result instead of a protocol error.
    #[schemars(required)]
    #[schemars(description = "URL of the image to download and re-host")]
    pub image_url: Option<String>,
    #[schemars(description = "Prefix for the temporary file name (default \"mcp_upload_\")")]
    #[serde(default)]
    pub filename_prefix: Option<String>,
}

/// Structured metadata returned alongside a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSuccess {
    pub raw_response: String,
    pub uploaded_image_url: Option<String>,
    pub status: OutcomeStatus,
    pub converted_to_jpeg: bool,
}

impl From<&UploadOutcome> for UploadSuccess {
    fn from(outcome: &UploadOutcome) -> Self {
        Self {
            raw_response: outcome.raw_response.clone(),
            uploaded_image_url: outcome.resolved_url.clone(),
            status: outcome.status(),
            converted_to_jpeg: outcome.converted,
        }
    }
}

/// Structured metadata returned when any stage fails.
#[derive(Debug, Clone, Serialize)]
pub struct UploadFailure {
    pub error_details: String,
    pub stderr: Option<String>,
    pub stdout: Option<String>,
    pub status: &'static str,
}

impl From<&TransferError> for UploadFailure {
    fn from(err: &TransferError) -> Self {
        Self {
            error_details: err.to_string(),
            stderr: err.stderr().map(str::to_string),
            stdout: err.stdout().map(str::to_string),
            status: "failure",
        }
    }
}
