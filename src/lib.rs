//! Tool Proxy Library
//!
//! An OpenAI-compatible HTTP proxy that sits in front of a model backend and
//! resolves the model's tool calls locally:
//! - Sandboxed file reads, listings, creation and deletion
//! - Whole-file and line-range edits with timestamped backups
//! - Shell commands with a timeout and output limits
//! - Filename, content and definition search
//!
//! # Example
//!
//! ```ignore
//! use tool_proxy::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (config, _) = Config::load(std::path::Path::new("config.yaml"))?;
//!     tool_proxy::server::start(config).await
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod security;
pub mod server;
pub mod tools;

pub use agent::{
    llm::{BackendClient, ChatBackend},
    tool_loop::Orchestrator,
    tools::{ToolContext, ToolResult},
};
pub use config::Config;
pub use error::{ProxyError, ToolError};
pub use security::SecurityPolicy;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "tool-proxy";
