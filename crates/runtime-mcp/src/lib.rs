//! JSON-RPC 2.0 client and tool registry for Model Context Protocol servers.

pub mod client;
pub mod protocol;
pub mod registry;

pub use client::{McpClient, McpClientError};
pub use protocol::{McpTool, ToolCallOutcome};
pub use registry::{McpRegistry, RefreshReport, RegisteredTool};
