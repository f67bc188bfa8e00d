//! Legacy transport that shells out to `curl`.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::process::Command;

use super::{discard_partial, Transport};
use crate::classify::{classify, content_type_for};
use crate::config::RelayConfig;
use crate::error::{captured, Operation, TransferError, TransferResult};

/// curl exit code for "operation timed out".
const CURL_TIMEOUT_EXIT: i32 = 28;
/// curl exit code for "too many redirects".
const CURL_TOO_MANY_REDIRECTS_EXIT: i32 = 47;

#[derive(Debug, Clone)]
pub struct CurlTransport {
    program: String,
    fetch_timeout: Duration,
    upload_timeout: Duration,
    max_redirects: usize,
}

impl CurlTransport {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            program: config.curl_path.clone(),
            fetch_timeout: config.fetch_timeout,
            upload_timeout: config.upload_timeout,
            max_redirects: config.max_redirects,
        }
    }

    async fn run(
        &self,
        operation: Operation,
        timeout: Duration,
        args: Vec<String>,
    ) -> TransferResult<Output> {
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // curl enforces --max-time itself; this cap also covers a hung process.
        let output = match tokio::time::timeout(timeout + Duration::from_secs(1), child).await {
            Ok(output) => output.map_err(|e| {
                let message = if e.kind() == std::io::ErrorKind::NotFound {
                    format!("'{}' is not installed or not on PATH", self.program)
                } else {
                    format!("Failed to execute '{}': {}", self.program, e)
                };
                TransferError::network(operation, message)
            })?,
            Err(_) => {
                return Err(TransferError::Timeout {
                    operation,
                    secs: timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(curl_failure(operation, &output, timeout));
        }
        Ok(output)
    }
}

#[async_trait]
impl Transport for CurlTransport {
    #[tracing::instrument(skip(self, url, dest), fields(url = %url))]
    async fn fetch(&self, url: &Url, dest: &Path) -> TransferResult<()> {
        let args = vec![
            "--silent".to_string(),
            "--show-error".to_string(),
            "--location".to_string(),
            "--proto".to_string(),
            "=http,https".to_string(),
            "--proto-redir".to_string(),
            "=http,https".to_string(),
            "--max-redirs".to_string(),
            self.max_redirects.to_string(),
            "--max-time".to_string(),
            self.fetch_timeout.as_secs().to_string(),
            "--output".to_string(),
            dest.to_string_lossy().to_string(),
            "--write-out".to_string(),
            "%{http_code}".to_string(),
            url.to_string(),
        ];

        let result = self
            .run(Operation::Download, self.fetch_timeout, args)
            .await
            .and_then(|output| {
                let status = parse_status(String::from_utf8_lossy(&output.stdout).trim())
                    .ok_or_else(|| {
                        TransferError::network(Operation::Download, "curl reported no HTTP status")
                    })?;
                if (200..300).contains(&status) {
                    Ok(())
                } else {
                    Err(TransferError::HttpStatus {
                        operation: Operation::Download,
                        status,
                        body: None,
                    })
                }
            });

        if result.is_err() {
            discard_partial(dest).await;
        }
        result
    }

    #[tracing::instrument(skip(self, file, endpoint), fields(endpoint = %endpoint))]
    async fn upload(&self, file: &Path, endpoint: &Url) -> TransferResult<String> {
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.jpg");
        let content_type = content_type_for(&classify(filename));

        let args = vec![
            "--silent".to_string(),
            "--show-error".to_string(),
            "--max-time".to_string(),
            self.upload_timeout.as_secs().to_string(),
            "--header".to_string(),
            "Accept: application/json".to_string(),
            "--form".to_string(),
            format!(
                "file=@{};filename={};type={}",
                form_quote(&file.to_string_lossy()),
                form_quote(filename),
                content_type
            ),
            "--write-out".to_string(),
            "\n%{http_code}".to_string(),
            endpoint.to_string(),
        ];

        let output = self.run(Operation::Upload, self.upload_timeout, args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let (body, status) = split_status_trailer(&stdout).ok_or_else(|| {
            TransferError::network(Operation::Upload, "curl reported no HTTP status")
        })?;

        if !(200..300).contains(&status) {
            return Err(TransferError::HttpStatus {
                operation: Operation::Upload,
                status,
                body: Some(body.to_string()).filter(|b| !b.trim().is_empty()),
            });
        }
        Ok(body.to_string())
    }
}

fn parse_status(code: &str) -> Option<u16> {
    code.parse::<u16>().ok().filter(|c| *c != 0)
}

/// Split `"<body>\n<status>"` as produced by `--write-out "\n%{http_code}"`.
fn split_status_trailer(stdout: &str) -> Option<(&str, u16)> {
    let (body, code) = stdout.rsplit_once('\n')?;
    Some((body, parse_status(code.trim())?))
}

/// Quote a `--form` value so `;` and `,` in paths are not read as field separators.
fn form_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn curl_failure(operation: Operation, output: &Output, timeout: Duration) -> TransferError {
    match output.status.code() {
        Some(CURL_TIMEOUT_EXIT) => TransferError::Timeout {
            operation,
            secs: timeout.as_secs(),
        },
        Some(CURL_TOO_MANY_REDIRECTS_EXIT) => TransferError::Network {
            operation,
            message: "Too many redirects".to_string(),
            stderr: captured(&output.stderr),
        },
        code => TransferError::Network {
            operation,
            message: match code {
                Some(code) => format!("curl exited with code {}", code),
                None => "curl was terminated by a signal".to_string(),
            },
            stderr: captured(&output.stderr),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_status_trailer() {
        assert_eq!(
            split_status_trailer("{\"url\":\"x\"}\n200"),
            Some(("{\"url\":\"x\"}", 200))
        );
        assert_eq!(
            split_status_trailer("line one\nline two\n502"),
            Some(("line one\nline two", 502))
        );
        assert_eq!(split_status_trailer("\n201"), Some(("", 201)));
        assert_eq!(split_status_trailer("no trailer"), None);
        assert_eq!(split_status_trailer("body\n000"), None);
    }

    #[test]
    fn test_form_quote() {
        assert_eq!(form_quote("/tmp/a.png"), r#""/tmp/a.png""#);
        assert_eq!(form_quote("/tmp/x;type=a,b.png"), r#""/tmp/x;type=a,b.png""#);
        assert_eq!(form_quote(r#"say "hi"\"#), r#""say \"hi\"\\""#);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("404"), Some(404));
        assert_eq!(parse_status("000"), None);
        assert_eq!(parse_status(""), None);
    }

    /// Write an executable stand-in for curl that runs `script`.
    #[cfg(unix)]
    fn fake_curl(dir: &Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-curl");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    fn transport_with(program: String, timeout_secs: u64) -> CurlTransport {
        let mut config = RelayConfig::new(Url::parse("https://img.host/upload").unwrap());
        config.curl_path = program;
        config.fetch_timeout = Duration::from_secs(timeout_secs);
        config.upload_timeout = Duration::from_secs(timeout_secs);
        CurlTransport::new(&config)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_curl_timeout_exit_maps_to_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_curl(dir.path(), "echo 'curl: (28) Operation timed out' >&2\nexit 28");
        let transport = transport_with(program, 7);

        let upload = dir.path().join("a.png");
        std::fs::write(&upload, b"png").unwrap();
        let err = transport
            .upload(&upload, &Url::parse("https://img.host/upload").unwrap())
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                TransferError::Timeout {
                    operation: Operation::Upload,
                    secs: 7
                }
            ),
            "{:?}",
            err
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_curl_redirect_exit_maps_to_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_curl(
            dir.path(),
            "echo 'curl: (47) Maximum (5) redirects followed' >&2\nexit 47",
        );
        let transport = transport_with(program, 5);

        let dest = dir.path().join("out.png");
        let err = transport
            .fetch(&Url::parse("https://example.com/a.png").unwrap(), &dest)
            .await
            .unwrap_err();

        match err {
            TransferError::Network {
                operation,
                message,
                stderr,
            } => {
                assert_eq!(operation, Operation::Download);
                assert_eq!(message, "Too many redirects");
                assert!(stderr.unwrap().contains("(47)"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_curl_is_killed_after_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_curl(dir.path(), "sleep 30");
        let transport = transport_with(program, 1);

        let dest = dir.path().join("out.png");
        std::fs::write(&dest, b"partial").unwrap();
        let started = std::time::Instant::now();
        let err = transport
            .fetch(&Url::parse("https://example.com/a.png").unwrap(), &dest)
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(
            matches!(
                err,
                TransferError::Timeout {
                    operation: Operation::Download,
                    secs: 1
                }
            ),
            "{:?}",
            err
        );
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_missing_curl_is_a_network_error() {
        let mut config = RelayConfig::new(Url::parse("https://img.host/upload").unwrap());
        config.curl_path = "imgbridge-no-such-curl".to_string();
        let transport = CurlTransport::new(&config);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.png");
        let err = transport
            .fetch(&Url::parse("https://example.com/a.png").unwrap(), &dest)
            .await
            .unwrap_err();

        match err {
            TransferError::Network { message, .. } => {
                assert!(message.contains("not installed"), "{}", message)
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!dest.exists());
    }
}
