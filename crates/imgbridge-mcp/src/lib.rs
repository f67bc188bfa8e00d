//! imgbridge MCP Server
//!
//! Model Context Protocol server that exposes the image transfer pipeline
//! as a tool for AI assistants (Claude Desktop, Cursor, etc.)

pub mod server;
pub mod tools;

pub use imgbridge_core::{RelayConfig, TransferPipeline};
pub use server::ImgBridgeService;
