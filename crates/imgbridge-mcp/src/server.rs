//! MCP server using rmcp SDK
//!
//! Exposes the transfer pipeline as the `upload_image_from_url` tool over stdio.

use crate::tools::*;
use imgbridge_core::config::UPLOAD_URL_ENV;
use imgbridge_core::{TransferError, TransferPipeline, TransferRequest, UploadOutcome};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::Parameters;
use rmcp::model::*;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::Serialize;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

fn text_content(s: impl Into<String>) -> Content {
    Content {
        raw: RawContent::Text(RawTextContent { text: s.into() }),
        annotations: None,
    }
}

fn json_content<T: Serialize>(value: &T) -> Result<Content, ErrorData> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ErrorData {
        code: ErrorCode(-32603),
        message: Cow::from(e.to_string()),
        data: None,
    })?;
    Ok(text_content(text))
}

fn success_result(outcome: &UploadOutcome) -> Result<CallToolResult, ErrorData> {
    let summary = match &outcome.resolved_url {
        Some(url) => format!("Image uploaded successfully: {}", url),
        None => "Image uploaded, but the hosted URL could not be determined from the response. \
                 See raw_response."
            .to_string(),
    };
    let metadata = json_content(&UploadSuccess::from(outcome))?;
    Ok(CallToolResult::success(vec![text_content(summary), metadata]))
}

fn failure_result(err: &TransferError) -> Result<CallToolResult, ErrorData> {
    let metadata = json_content(&UploadFailure::from(err))?;
    Ok(CallToolResult::error(vec![
        text_content(format!("Failed to upload image: {}", err)),
        metadata,
    ]))
}

#[derive(Debug, Clone)]
pub struct ImgBridgeService {
    pipeline: Arc<TransferPipeline>,
    tool_router: ToolRouter<ImgBridgeService>,
}

#[tool_router]
impl ImgBridgeService {
    pub fn new(pipeline: TransferPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Download an image from a URL, convert WebP to JPEG, upload it to the configured image host and return the hosted image URL"
    )]
    async fn upload_image_from_url(
        &self,
        Parameters(req): Parameters<UploadImageFromUrlRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = match TransferRequest::new(
            req.image_url.as_deref(),
            req.filename_prefix.as_deref(),
        ) {
            Ok(request) => self.pipeline.run(&request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => success_result(&outcome),
            Err(e) => {
                tracing::debug!(error_code = e.error_code(), "Returning tool failure");
                failure_result(&e)
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for ImgBridgeService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "imgbridge-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            instructions: Some(format!(
                "imgbridge MCP: upload_image_from_url re-hosts an image from a URL on the \
                 configured image host (WebP is converted to JPEG). Set {}.",
                UPLOAD_URL_ENV
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgbridge_core::{HttpTransport, ImageEncoder, RelayConfig, Transport, TransferResult};
    use serde_json::Value;
    use std::path::Path;

    struct CopyEncoder;

    #[async_trait::async_trait]
    impl ImageEncoder for CopyEncoder {
        async fn reencode(&self, src: &Path, dst: &Path) -> TransferResult<()> {
            tokio::fs::copy(src, dst).await?;
            Ok(())
        }
    }

    fn service_for(upload_url: &str, temp: &tempfile::TempDir) -> ImgBridgeService {
        let mut config = RelayConfig::new(upload_url.parse().unwrap());
        config.temp_dir = temp.path().to_path_buf();
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config).unwrap());
        ImgBridgeService::new(TransferPipeline::new(config, transport, Arc::new(CopyEncoder)))
    }

    /// Returns (is_error, summary text, metadata JSON).
    fn unpack(result: &CallToolResult) -> (bool, String, Value) {
        let value = serde_json::to_value(result).unwrap();
        let is_error = value["isError"].as_bool().unwrap_or(false);
        let content = value["content"].as_array().unwrap();
        let summary = content[0]["text"].as_str().unwrap().to_string();
        let metadata = serde_json::from_str(content[1]["text"].as_str().unwrap()).unwrap();
        (is_error, summary, metadata)
    }

    #[tokio::test]
    async fn test_missing_image_url_is_a_failure_result() {
        let temp = tempfile::tempdir().unwrap();
        let service = service_for("http://127.0.0.1:9/upload", &temp);

        let result = service
            .upload_image_from_url(Parameters(UploadImageFromUrlRequest {
                image_url: None,
                filename_prefix: None,
            }))
            .await
            .unwrap();

        let (is_error, summary, metadata) = unpack(&result);
        assert!(is_error);
        assert!(summary.contains("image_url is required"));
        assert_eq!(metadata["status"], "failure");
    }

    #[tokio::test]
    async fn test_webp_upload_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let temp = tempfile::tempdir().unwrap();

        server
            .mock("GET", "/a.webp")
            .with_status(200)
            .with_body("webp-bytes")
            .create_async()
            .await;
        server
            .mock("POST", "/upload")
            .with_status(200)
            .with_body(r#"{"status":true,"data":{"links":{"url":"https://img.host/x.jpg"}}}"#)
            .create_async()
            .await;

        let service = service_for(&format!("{}/upload", server.url()), &temp);
        let result = service
            .upload_image_from_url(Parameters(UploadImageFromUrlRequest {
                image_url: Some(format!("{}/a.webp", server.url())),
                filename_prefix: None,
            }))
            .await
            .unwrap();

        let (is_error, summary, metadata) = unpack(&result);
        assert!(!is_error);
        assert!(summary.contains("https://img.host/x.jpg"));
        assert_eq!(metadata["status"], "success");
        assert_eq!(metadata["uploaded_image_url"], "https://img.host/x.jpg");
        assert_eq!(metadata["converted_to_jpeg"], true);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_failure_reports_status_code() {
        let mut server = mockito::Server::new_async().await;
        let temp = tempfile::tempdir().unwrap();

        server
            .mock("GET", "/missing.png")
            .with_status(404)
            .create_async()
            .await;

        let service = service_for(&format!("{}/upload", server.url()), &temp);
        let result = service
            .upload_image_from_url(Parameters(UploadImageFromUrlRequest {
                image_url: Some(format!("{}/missing.png", server.url())),
                filename_prefix: Some("test_".to_string()),
            }))
            .await
            .unwrap();

        let (is_error, _, metadata) = unpack(&result);
        assert!(is_error);
        assert_eq!(metadata["status"], "failure");
        assert!(metadata["error_details"].as_str().unwrap().contains("404"));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_server_info_advertises_tools() {
        let temp = tempfile::tempdir().unwrap();
        let service = service_for("https://img.host/upload", &temp);
        let info = service.get_info();
        assert_eq!(info.server_info.name, "imgbridge-mcp");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains(UPLOAD_URL_ENV));
    }
}
