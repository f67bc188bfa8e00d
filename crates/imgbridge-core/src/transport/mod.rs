//! Network transports: fetch a source image and upload a local file.

mod curl;
mod http;

pub use curl::CurlTransport;
pub use http::HttpTransport;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;

use crate::config::{RelayConfig, TransportKind};
use crate::error::TransferResult;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Download `url` into `dest`, following redirects.
    ///
    /// A partially written `dest` is removed before an error is returned.
    async fn fetch(&self, url: &Url, dest: &Path) -> TransferResult<()>;

    /// Post `file` as the multipart part `file` and return the body verbatim.
    async fn upload(&self, file: &Path, endpoint: &Url) -> TransferResult<String>;
}

/// Build the transport selected by the configuration.
pub fn from_config(config: &RelayConfig) -> TransferResult<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::Native => Arc::new(HttpTransport::new(config)?),
        TransportKind::Curl => Arc::new(CurlTransport::new(config)),
    };
    Ok(transport)
}

/// Best-effort removal of a partial download.
async fn discard_partial(dest: &Path) {
    if let Err(e) = tokio::fs::remove_file(dest).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %dest.display(), error = %e, "Failed to remove partial download");
        }
    }
}
