//! Error types
//!
//! `ToolError` covers everything a tool handler can report back to the model.
//! It never escapes the dispatcher: it is folded into a failed `ToolResult`.
//! `ProxyError` covers the few failures that end an HTTP request.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by tool handlers
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("{kind} not found: {}", .path.display())]
    NotFound { kind: &'static str, path: PathBuf },

    #[error("Path is not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("File already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("File too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("Binary file not supported: {}", .0.display())]
    BinaryUnsupported(PathBuf),

    #[error("Invalid line range: {start}-{end} (file has {lines} lines)")]
    InvalidRange { start: usize, end: usize, lines: usize },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Failed to create backup: {0}")]
    BackupFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn not_found(kind: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            kind,
            path: path.into(),
        }
    }

    /// Stable machine-readable code, reported as `error_kind`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccessDenied(_) => "access_denied",
            Self::NotFound { .. } => "not_found",
            Self::NotAFile(_) => "not_a_file",
            Self::NotADirectory(_) => "not_a_directory",
            Self::AlreadyExists(_) => "already_exists",
            Self::TooLarge { .. } => "too_large",
            Self::BinaryUnsupported(_) => "binary_unsupported",
            Self::InvalidRange { .. } => "invalid_range",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::InvalidPattern(_) => "invalid_pattern",
            Self::Timeout(_) => "timeout",
            Self::ExecutionFailure(_) => "execution_failure",
            Self::UnknownTool(_) => "unknown_tool",
            Self::BackupFailed(_) => "backup_failed",
            Self::Io(_) => "io_error",
        }
    }
}

impl From<regex::Error> for ToolError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidPattern(err.to_string())
    }
}

impl From<glob::PatternError> for ToolError {
    fn from(err: glob::PatternError) -> Self {
        Self::InvalidPattern(err.to_string())
    }
}

pub type ToolOutcome<T> = std::result::Result<T, ToolError>;

/// Errors that terminate a proxied request
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Backend unreachable: {0}")]
    UpstreamUnavailable(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable(_) => "proxy_error",
            Self::InvalidRequest(_) => "invalid_request_error",
        }
    }
}
