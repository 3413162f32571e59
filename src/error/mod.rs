//! Error types for the MCP bridge.

use thiserror::Error;

/// Primary error type for all bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("creating transport: {0}")]
    Transport(String),

    #[error("connecting: {0}")]
    Connection(String),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("operation cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Schema(String),

    #[error("server {server}: {source}")]
    Server {
        server: String,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("duplicate tool name {tool:?}: found in both {first:?} and {second:?}")]
    DuplicateTool {
        tool: String,
        first: String,
        second: String,
    },

    #[error("tool {tool:?} returned unsupported content of kind {kind:?}")]
    UnsupportedContent { tool: String, kind: String },

    #[error("errors closing MCP connections: {}", format_close_errors(.0))]
    Close(Vec<(String, BridgeError)>),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },
}

impl BridgeError {
    /// Attribute an error to the backend it came from.
    pub fn server(server: impl Into<String>, source: BridgeError) -> Self {
        Self::Server {
            server: server.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Server { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Name of the backend this error is attributed to, if any.
    pub fn server_name(&self) -> Option<&str> {
        match self {
            Self::Server { server, .. } => Some(server),
            _ => None,
        }
    }
}

fn format_close_errors(errors: &[(String, BridgeError)]) -> String {
    errors
        .iter()
        .map(|(server, error)| format!("closing {server}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
