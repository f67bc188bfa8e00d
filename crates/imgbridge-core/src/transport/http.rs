//! Native transport backed by reqwest.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, LOCATION};
use reqwest::multipart::{Form, Part};
use reqwest::{redirect, Client, StatusCode, Url};
use tokio::io::AsyncWriteExt;

use super::{discard_partial, Transport};
use crate::classify::{classify, content_type_for};
use crate::config::RelayConfig;
use crate::error::{Operation, TransferError, TransferResult};

/// HTTP transport with manual redirect handling and per-operation timeouts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    fetch_timeout: Duration,
    upload_timeout: Duration,
    max_redirects: usize,
}

impl HttpTransport {
    pub fn new(config: &RelayConfig) -> TransferResult<Self> {
        // Redirects are followed by hand so the hop count can be capped and logged.
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(concat!("imgbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                TransferError::network(
                    Operation::Download,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            fetch_timeout: config.fetch_timeout,
            upload_timeout: config.upload_timeout,
            max_redirects: config.max_redirects,
        })
    }

    async fn download(&self, url: &Url, dest: &Path) -> TransferResult<()> {
        let mut current = url.clone();
        let mut hops = 0usize;

        let mut response = loop {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| self.request_error(Operation::Download, &e))?;

            if !is_followed_redirect(response.status()) {
                break response;
            }
            let Some(location) = response.headers().get(LOCATION) else {
                break response;
            };

            if hops >= self.max_redirects {
                return Err(TransferError::network(
                    Operation::Download,
                    format!("Too many redirects (limit {})", self.max_redirects),
                ));
            }

            let location = location.to_str().map_err(|_| {
                TransferError::network(Operation::Download, "Redirect Location header is not valid text")
            })?;
            let next = current.join(location).map_err(|e| {
                TransferError::network(
                    Operation::Download,
                    format!("Invalid redirect target '{}': {}", location, e),
                )
            })?;

            tracing::debug!(from = %current, to = %next, status = %response.status(), "Following redirect");
            current = next;
            hops += 1;
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::HttpStatus {
                operation: Operation::Download,
                status: status.as_u16(),
                body: None,
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.request_error(Operation::Download, &e))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(url = %current, bytes = written, "Download complete");
        Ok(())
    }

    async fn post_file(&self, file: &Path, endpoint: &Url) -> TransferResult<String> {
        let data = tokio::fs::read(file).await?;
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.jpg")
            .to_string();
        let content_type = content_type_for(&classify(&filename));

        let part = Part::bytes(data)
            .file_name(filename)
            .mime_str(content_type)
            .map_err(|e| self.request_error(Operation::Upload, &e))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(endpoint.clone())
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_error(Operation::Upload, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.request_error(Operation::Upload, &e))?;

        if !status.is_success() {
            return Err(TransferError::HttpStatus {
                operation: Operation::Upload,
                status: status.as_u16(),
                body: Some(body).filter(|b| !b.trim().is_empty()),
            });
        }

        Ok(body)
    }

    fn request_error(&self, operation: Operation, err: &reqwest::Error) -> TransferError {
        if err.is_timeout() {
            let timeout = match operation {
                Operation::Download => self.fetch_timeout,
                Operation::Upload => self.upload_timeout,
            };
            return TransferError::Timeout {
                operation,
                secs: timeout.as_secs(),
            };
        }
        TransferError::from_reqwest(operation, err)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(skip(self, url, dest), fields(url = %url))]
    async fn fetch(&self, url: &Url, dest: &Path) -> TransferResult<()> {
        let result = match tokio::time::timeout(self.fetch_timeout, self.download(url, dest)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransferError::Timeout {
                operation: Operation::Download,
                secs: self.fetch_timeout.as_secs(),
            }),
        };

        if result.is_err() {
            discard_partial(dest).await;
        }
        result
    }

    #[tracing::instrument(skip(self, file, endpoint), fields(endpoint = %endpoint))]
    async fn upload(&self, file: &Path, endpoint: &Url) -> TransferResult<String> {
        match tokio::time::timeout(self.upload_timeout, self.post_file(file, endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::Timeout {
                operation: Operation::Upload,
                secs: self.upload_timeout.as_secs(),
            }),
        }
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_followed_redirects() {
        assert!(is_followed_redirect(StatusCode::MOVED_PERMANENTLY));
        assert!(is_followed_redirect(StatusCode::FOUND));
        assert!(is_followed_redirect(StatusCode::PERMANENT_REDIRECT));
        assert!(!is_followed_redirect(StatusCode::NOT_MODIFIED));
        assert!(!is_followed_redirect(StatusCode::OK));
    }
}
