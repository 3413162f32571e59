//! Model Context Protocol (MCP) bridging: connect backends, translate their
//! tools for an agent, and expose a subagent as an MCP server.

pub mod aggregate;
pub mod bridge;
pub mod client;
pub mod filter;
pub mod schema;
pub mod server;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregate::{MCPBridgeState, MCPConnection, MCPOrchestrator};
pub use bridge::MCPToolCallback;
pub use client::{MCPConnector, MCPSession, SessionConnector, ToolSession};
pub use filter::{filter_tools, FilterOutcome, ToolFilter};
pub use schema::{Schema, SchemaShape, ToolDescriptor};
pub use server::{executor_fn, MCPSubagentServer, SubagentExecutor, SubagentInput};
pub use transport::{build_transport, BackendTransport};
