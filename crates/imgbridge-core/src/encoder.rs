//! WebP normalization.
//!
//! [`ImageEncoder`] is the seam between the pipeline and whatever performs the
//! conversion: [`CommandEncoder`] runs an external utility, [`NativeEncoder`]
//! decodes and re-encodes in process.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use tokio::process::Command;

use crate::error::{captured, TransferError, TransferResult};

#[async_trait]
pub trait ImageEncoder: Send + Sync {
    /// Re-encode `src` into a commonly supported format at `dst`.
    async fn reencode(&self, src: &Path, dst: &Path) -> TransferResult<()>;
}

/// Runs `<program> <src> <dst>` (ImageMagick `convert` semantics).
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    program: String,
}

impl CommandEncoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ImageEncoder for CommandEncoder {
    #[tracing::instrument(skip(self), fields(program = %self.program))]
    async fn reencode(&self, src: &Path, dst: &Path) -> TransferResult<()> {
        let output = Command::new(&self.program)
            .arg(src)
            .arg(dst)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                let message = if e.kind() == std::io::ErrorKind::NotFound {
                    format!("'{}' is not installed or not on PATH", self.program)
                } else {
                    format!("Failed to execute '{}': {}", self.program, e)
                };
                TransferError::Conversion {
                    message,
                    stderr: Some(e.to_string()),
                    stdout: None,
                }
            })?;

        if !output.status.success() {
            return Err(TransferError::Conversion {
                message: format!("'{}' exited with {}", self.program, output.status),
                stderr: captured(&output.stderr),
                stdout: captured(&output.stdout),
            });
        }

        Ok(())
    }
}

/// Decodes with the `image` crate and writes JPEG into an existing `dst`.
#[derive(Debug, Clone)]
pub struct NativeEncoder {
    quality: u8,
}

impl NativeEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for NativeEncoder {
    fn default() -> Self {
        Self::new(90)
    }
}

#[async_trait]
impl ImageEncoder for NativeEncoder {
    async fn reencode(&self, src: &Path, dst: &Path) -> TransferResult<()> {
        let src = src.to_path_buf();
        let dst = dst.to_path_buf();
        let quality = self.quality;

        tokio::task::spawn_blocking(move || encode_jpeg(&src, &dst, quality))
            .await
            .map_err(|e| TransferError::conversion(format!("Encoder task failed: {}", e)))?
    }
}

fn encode_jpeg(src: &Path, dst: &Path, quality: u8) -> TransferResult<()> {
    let decoded = image::ImageReader::open(src)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| TransferError::conversion(format!("Failed to decode image: {}", e)))?;

    // JPEG has no alpha channel.
    let rgb = decoded.to_rgb8();

    // `dst` is created by its artifact guard. Opening without `create` keeps a
    // task that outlives a cancelled request from recreating a released file.
    let file = std::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(dst)?;
    let mut writer = std::io::BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(&rgb)
        .map_err(|e| TransferError::conversion(format!("Failed to encode JPEG: {}", e)))?;

    Ok(())
}
