//! Sessions with MCP backends.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    JsonObject, ServerInfo, Tool,
};
use rmcp::service::{ClientInitializeError, Peer, RoleClient, ServiceError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};

use super::transport::{BackendTransport, MCPRunningService};

/// Operations the bridge needs from one open backend session.
#[async_trait]
pub trait ToolSession: Send + Sync {
    async fn list_tools(&self, ct: &CancellationToken) -> Result<Vec<Tool>>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        ct: &CancellationToken,
    ) -> Result<CallToolResult>;

    /// Release the session. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Opens sessions over built transports.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn open(
        &self,
        transport: BackendTransport,
        timeout: Duration,
        ct: &CancellationToken,
    ) -> Result<Arc<dyn ToolSession>>;
}

/// The default connector: runs the MCP handshake with a fixed client identity.
#[derive(Debug, Clone)]
pub struct MCPConnector {
    client_info: ClientInfo,
}

impl MCPConnector {
    pub fn new(client_info: ClientInfo) -> Self {
        Self { client_info }
    }

    /// A connector identifying as `name`/`version`.
    pub fn with_identity(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(client_info(name, version))
    }

    /// Open a concrete [`MCPSession`], keeping access to the server's initialize result.
    pub async fn connect(
        &self,
        transport: BackendTransport,
        timeout: Duration,
        ct: &CancellationToken,
    ) -> Result<MCPSession> {
        let handshake = transport.connect(self.client_info.clone());
        let service = bounded(timeout, ct, async {
            handshake.await.map_err(map_client_initialize_error)
        })
        .await?;
        Ok(MCPSession::new(service, timeout))
    }
}

impl Default for MCPConnector {
    fn default() -> Self {
        Self::with_identity(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl SessionConnector for MCPConnector {
    async fn open(
        &self,
        transport: BackendTransport,
        timeout: Duration,
        ct: &CancellationToken,
    ) -> Result<Arc<dyn ToolSession>> {
        let session = self.connect(transport, timeout, ct).await?;
        Ok(Arc::new(session))
    }
}

/// Build the identity a client announces during initialize.
pub fn client_info(name: impl Into<String>, version: impl Into<String>) -> ClientInfo {
    ClientInfo {
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: name.into(),
            title: None,
            version: version.into(),
            description: None,
            icons: None,
            website_url: None,
        },
        meta: None,
    }
}

/// An initialized session with one backend.
///
/// Calls go through a cloned [`Peer`], which multiplexes requests, so a
/// session can serve concurrent calls.
pub struct MCPSession {
    peer: Peer<RoleClient>,
    service: Mutex<Option<MCPRunningService>>,
    timeout: Duration,
}

impl MCPSession {
    pub fn new(service: MCPRunningService, timeout: Duration) -> Self {
        Self {
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            timeout,
        }
    }

    /// The server's initialize result.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.peer.peer_info()
    }
}

#[async_trait]
impl ToolSession for MCPSession {
    async fn list_tools(&self, ct: &CancellationToken) -> Result<Vec<Tool>> {
        bounded(self.timeout, ct, async {
            match self.peer.list_all_tools().await {
                Ok(tools) => Ok(tools),
                Err(ServiceError::UnexpectedResponse) => self
                    .peer
                    .list_tools(None)
                    .await
                    .map(|page| page.tools)
                    .map_err(|e| map_service_error("list_tools", e)),
                Err(e) => Err(map_service_error("list_tools", e)),
            }
        })
        .await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        ct: &CancellationToken,
    ) -> Result<CallToolResult> {
        let params = CallToolRequestParams {
            meta: None,
            name: name.to_owned().into(),
            arguments,
            task: None,
        };
        bounded(self.timeout, ct, async {
            self.peer
                .call_tool(params)
                .await
                .map_err(|e| map_service_error("call_tool", e))
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let Some(mut service) = self.service.lock().await.take() else {
            return Ok(());
        };
        service
            .close()
            .await
            .map(|_| ())
            .map_err(|e| BridgeError::Protocol(format!("MCP session task failed: {e}")))
    }
}

/// Run `operation` under a timeout, giving up early if `ct` fires.
async fn bounded<T>(
    timeout: Duration,
    ct: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = ct.cancelled() => Err(BridgeError::Cancelled),
        outcome = tokio::time::timeout(timeout, operation) => {
            outcome.map_err(|_| BridgeError::Timeout(timeout.as_millis() as u64))?
        }
    }
}

pub(crate) fn map_client_initialize_error(error: ClientInitializeError) -> BridgeError {
    match error {
        ClientInitializeError::ConnectionClosed(context) => {
            BridgeError::Connection(format!("MCP initialize connection closed: {context}"))
        }
        ClientInitializeError::TransportError { error, context } => BridgeError::Connection(
            format!("MCP initialize transport error ({context}): {error}"),
        ),
        ClientInitializeError::JsonRpcError(error) => BridgeError::Connection(format!(
            "MCP initialize JSON-RPC error {}: {}",
            error.code.0, error.message
        )),
        ClientInitializeError::Cancelled => BridgeError::Cancelled,
        other => BridgeError::Connection(format!("MCP initialize error: {other}")),
    }
}

pub(crate) fn map_service_error(context: &str, error: ServiceError) -> BridgeError {
    match error {
        ServiceError::McpError(error) => BridgeError::Protocol(format!(
            "{context}: MCP error {}: {}",
            error.code.0, error.message
        )),
        ServiceError::TransportSend(error) => {
            BridgeError::Protocol(format!("{context}: MCP transport send failed: {error}"))
        }
        ServiceError::TransportClosed => {
            BridgeError::Protocol(format!("{context}: MCP transport closed"))
        }
        ServiceError::UnexpectedResponse => {
            BridgeError::Protocol(format!("{context}: unexpected MCP response"))
        }
        ServiceError::Cancelled { reason } => {
            let suffix = reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            BridgeError::Protocol(format!("{context}: MCP request cancelled{suffix}"))
        }
        ServiceError::Timeout { timeout } => BridgeError::Timeout(timeout.as_millis() as u64),
        other => BridgeError::Protocol(format!("{context}: MCP service error: {other}")),
    }
}
