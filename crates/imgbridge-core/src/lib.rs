//! imgbridge core library
//!
//! Fetches an image from a URL, normalizes WebP to JPEG, uploads it to a
//! configured hosting endpoint and extracts the hosted URL from whatever
//! JSON the endpoint answers with.

pub mod artifact;
pub mod classify;
pub mod config;
pub mod encoder;
pub mod error;
pub mod interpret;
pub mod pipeline;
pub mod transport;

// Re-export commonly used types
pub use config::{EncoderKind, RelayConfig, TransportKind};
pub use encoder::{CommandEncoder, ImageEncoder, NativeEncoder};
pub use error::{LogLevel, Operation, TransferError, TransferResult};
pub use interpret::{interpret, ResponseShape};
pub use pipeline::{OutcomeStatus, PipelineResult, TransferPipeline, TransferRequest, UploadOutcome};
pub use transport::{CurlTransport, HttpTransport, Transport};
