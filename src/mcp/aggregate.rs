//! Connect every configured backend and merge their tools under one registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::error::{BridgeError, Result};

use super::bridge::MCPToolCallback;
use super::client::{MCPConnector, SessionConnector, ToolSession};
use super::filter::{filter_tools, ToolFilter};
use super::schema::ToolDescriptor;
use super::transport::build_transport;

/// One connected backend and the tools it exposes after filtering.
pub struct MCPConnection {
    pub name: String,
    pub config: BackendConfig,
    pub session: Arc<dyn ToolSession>,
    pub tools: Vec<ToolDescriptor>,
}

impl std::fmt::Debug for MCPConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MCPConnection")
            .field("name", &self.name)
            .field("kind", &self.config.kind)
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish()
    }
}

/// Every connected backend, in name order. Read-only once built.
#[derive(Debug, Default)]
pub struct MCPBridgeState {
    connections: Vec<MCPConnection>,
    routes: HashMap<String, usize>,
}

impl MCPBridgeState {
    pub fn connections(&self) -> &[MCPConnection] {
        &self.connections
    }

    pub fn connection(&self, name: &str) -> Option<&MCPConnection> {
        self.connections.iter().find(|c| c.name == name)
    }

    /// Name of the backend that provides `tool`.
    pub fn server_for_tool(&self, tool: &str) -> Option<&str> {
        self.routes
            .get(tool)
            .map(|&index| self.connections[index].name.as_str())
    }

    pub fn tool_count(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Descriptor/callback pairs for registering every bridged tool with an agent.
    pub fn tool_callbacks(&self) -> Vec<(ToolDescriptor, MCPToolCallback)> {
        self.connections
            .iter()
            .flat_map(|connection| {
                connection.tools.iter().map(|tool| {
                    (
                        tool.clone(),
                        MCPToolCallback::new(
                            connection.name.clone(),
                            tool.name.clone(),
                            connection.session.clone(),
                        ),
                    )
                })
            })
            .collect()
    }

    /// Close every session, continuing past failures.
    pub async fn close_all(&self) -> Result<()> {
        let mut failures = Vec::new();
        for connection in &self.connections {
            debug!(server = %connection.name, "closing MCP session");
            if let Err(error) = connection.session.close().await {
                warn!(server = %connection.name, %error, "failed to close MCP session");
                failures.push((connection.name.clone(), error));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Close(failures))
        }
    }
}

/// Connects backends sequentially, failing fast and rolling back on the first fault.
pub struct MCPOrchestrator {
    connector: Arc<dyn SessionConnector>,
    sink_address: Option<String>,
}

impl Default for MCPOrchestrator {
    fn default() -> Self {
        Self::new(MCPConnector::default(), None)
    }
}

impl MCPOrchestrator {
    pub fn new(connector: impl SessionConnector + 'static, sink_address: Option<String>) -> Self {
        Self {
            connector: Arc::new(connector),
            sink_address,
        }
    }

    /// Connect every backend in name order.
    ///
    /// On any fault the sessions opened so far are closed and the fault is
    /// returned; no partial state escapes.
    pub async fn connect_all(
        &self,
        servers: &BTreeMap<String, BackendConfig>,
        ct: &CancellationToken,
    ) -> Result<MCPBridgeState> {
        let mut state = MCPBridgeState::default();

        for (name, config) in servers {
            if ct.is_cancelled() {
                rollback(&state.connections, None).await;
                return Err(BridgeError::Cancelled);
            }

            info!(server = %name, kind = %config.kind, "connecting to MCP server");
            let session = match self.open(config, ct).await {
                Ok(session) => session,
                Err(error) => {
                    rollback(&state.connections, None).await;
                    return Err(attribute(name, error));
                }
            };

            let tools = match self.discover(name, config, session.as_ref(), &state, ct).await {
                Ok(tools) => tools,
                Err(error) => {
                    rollback(&state.connections, Some((name, session.as_ref()))).await;
                    return Err(attribute(name, error));
                }
            };

            let index = state.connections.len();
            for tool in &tools {
                state.routes.insert(tool.name.clone(), index);
            }
            info!(server = %name, tool_count = tools.len(), "connected to MCP server");
            state.connections.push(MCPConnection {
                name: name.clone(),
                config: config.clone(),
                session,
                tools,
            });
        }

        Ok(state)
    }

    async fn open(
        &self,
        config: &BackendConfig,
        ct: &CancellationToken,
    ) -> Result<Arc<dyn ToolSession>> {
        let transport = build_transport(config, self.sink_address.as_deref()).map_err(|e| match e {
            BridgeError::Transport(_) => e,
            other => BridgeError::Transport(other.to_string()),
        })?;
        self.connector
            .open(transport, config.timeout(), ct)
            .await
            .map_err(|e| match e {
                BridgeError::Connection(_) | BridgeError::Cancelled => e,
                other => BridgeError::Connection(other.to_string()),
            })
    }

    async fn discover(
        &self,
        name: &str,
        config: &BackendConfig,
        session: &dyn ToolSession,
        state: &MCPBridgeState,
        ct: &CancellationToken,
    ) -> Result<Vec<ToolDescriptor>> {
        let listed = session.list_tools(ct).await.map_err(|e| match e {
            BridgeError::Cancelled => e,
            other => BridgeError::Protocol(format!("listing tools: {other}")),
        })?;

        let filter = ToolFilter::from_config(config);
        let outcome = filter_tools(listed, &filter);
        if !outcome.excluded.is_empty() {
            info!(
                server = %name,
                filter = %filter,
                filtered_count = outcome.excluded.len(),
                filtered = %outcome.excluded_display(),
                "filtered MCP tools"
            );
        }

        let mut descriptors = Vec::with_capacity(outcome.retained.len());
        for tool in &outcome.retained {
            let descriptor = ToolDescriptor::from_wire(tool).map_err(|e| {
                BridgeError::Schema(format!("converting tool {:?}: {e}", tool.name))
            })?;
            if let Some(first) = state.server_for_tool(&descriptor.name) {
                return Err(BridgeError::DuplicateTool {
                    tool: descriptor.name,
                    first: first.to_owned(),
                    second: name.to_owned(),
                });
            }
            if descriptors
                .iter()
                .any(|d: &ToolDescriptor| d.name == descriptor.name)
            {
                return Err(BridgeError::DuplicateTool {
                    tool: descriptor.name,
                    first: name.to_owned(),
                    second: name.to_owned(),
                });
            }
            descriptors.push(descriptor);
        }
        Ok(descriptors)
    }
}

/// Attribute a fault to its backend; cancellations and collisions stay bare.
fn attribute(name: &str, error: BridgeError) -> BridgeError {
    match error {
        BridgeError::Cancelled | BridgeError::DuplicateTool { .. } => error,
        other => BridgeError::server(name, other),
    }
}

async fn rollback(opened: &[MCPConnection], current: Option<(&str, &dyn ToolSession)>) {
    if let Some((name, session)) = current {
        close_for_rollback(name, session).await;
    }
    for connection in opened.iter().rev() {
        close_for_rollback(&connection.name, connection.session.as_ref()).await;
    }
}

async fn close_for_rollback(name: &str, session: &dyn ToolSession) {
    info!(server = %name, "closing MCP session during rollback");
    if let Err(error) = session.close().await {
        warn!(server = %name, %error, "failed to close MCP session during rollback");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::test_support::{stdio_backend, MockConnector, MockSession};
    use pretty_assertions::assert_eq;
    use rmcp::model::Tool;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn servers(entries: Vec<(&str, BackendConfig)>) -> BTreeMap<String, BackendConfig> {
        entries
            .into_iter()
            .map(|(name, config)| (name.to_owned(), config))
            .collect()
    }

    fn tool_names(connection: &MCPConnection) -> Vec<&str> {
        connection.tools.iter().map(|t| t.name.as_str()).collect()
    }

    fn closes(session: &MockSession) -> Arc<AtomicUsize> {
        session.close_calls.clone()
    }

    #[tokio::test]
    async fn connects_in_name_order_and_applies_filters() {
        let mut beta = stdio_backend("beta");
        beta.enabled_tools = Some(vec!["write".into(), "missing".into()]);
        let mut alpha = stdio_backend("alpha");
        alpha.disabled_tools = Some(vec!["delete".into()]);

        let connector = MockConnector::default()
            .session("alpha", MockSession::with_tools(&["read", "delete", "list"]))
            .session("beta", MockSession::with_tools(&["stat", "write"]));
        let open_log = connector.open_log.clone();

        let orchestrator = MCPOrchestrator::new(connector, None);
        let state = orchestrator
            .connect_all(
                &servers(vec![("beta", beta), ("alpha", alpha)]),
                &CancellationToken::new(),
            )
            .await
            .expect("both backends should connect");

        assert_eq!(
            open_log.lock().expect("open log lock").as_slice(),
            &["alpha".to_string(), "beta".to_string()]
        );
        assert_eq!(state.connections().len(), 2);
        assert_eq!(tool_names(&state.connections()[0]), vec!["read", "list"]);
        assert_eq!(tool_names(&state.connections()[1]), vec!["write"]);
        assert_eq!(state.server_for_tool("write"), Some("beta"));
        assert_eq!(state.server_for_tool("delete"), None);
        assert_eq!(state.tool_count(), 3);

        let callbacks = state.tool_callbacks();
        assert_eq!(callbacks.len(), 3);
        assert_eq!(callbacks[2].1.server(), "beta");
    }

    #[tokio::test]
    async fn duplicate_tool_rolls_back_every_session() {
        let alpha = MockSession::with_tools(&["search"]);
        let beta = MockSession::with_tools(&["fetch", "search"]);
        let (alpha_closes, beta_closes) = (closes(&alpha), closes(&beta));

        let orchestrator = MCPOrchestrator::new(
            MockConnector::default()
                .session("alpha", alpha)
                .session("beta", beta),
            None,
        );
        let err = orchestrator
            .connect_all(
                &servers(vec![("alpha", stdio_backend("alpha")), ("beta", stdio_backend("beta"))]),
                &CancellationToken::new(),
            )
            .await
            .expect_err("colliding tool names should fail");

        assert_eq!(
            err.to_string(),
            "duplicate tool name \"search\": found in both \"alpha\" and \"beta\""
        );
        assert_eq!(alpha_closes.load(Ordering::SeqCst), 1);
        assert_eq!(beta_closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn filtered_tools_do_not_collide() {
        let mut beta = stdio_backend("beta");
        beta.disabled_tools = Some(vec!["search".into()]);
        let orchestrator = MCPOrchestrator::new(
            MockConnector::default()
                .session("alpha", MockSession::with_tools(&["search"]))
                .session("beta", MockSession::with_tools(&["search", "fetch"])),
            None,
        );
        let state = orchestrator
            .connect_all(
                &servers(vec![("alpha", stdio_backend("alpha")), ("beta", beta)]),
                &CancellationToken::new(),
            )
            .await
            .expect("filtered duplicate should not collide");
        assert_eq!(state.server_for_tool("search"), Some("alpha"));
        assert_eq!(state.server_for_tool("fetch"), Some("beta"));
    }

    #[tokio::test]
    async fn connect_failure_closes_earlier_sessions() {
        let alpha = MockSession::with_tools(&["read"]);
        let alpha_closes = closes(&alpha);
        let orchestrator = MCPOrchestrator::new(
            MockConnector::default()
                .session("alpha", alpha)
                .failing("beta", "refused"),
            None,
        );
        let err = orchestrator
            .connect_all(
                &servers(vec![("alpha", stdio_backend("alpha")), ("beta", stdio_backend("beta"))]),
                &CancellationToken::new(),
            )
            .await
            .expect_err("beta should fail to connect");

        assert_eq!(err.to_string(), "server beta: connecting: refused");
        assert_eq!(err.server_name(), Some("beta"));
        assert_eq!(alpha_closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn incomplete_backend_is_a_configuration_fault() {
        let err = MCPOrchestrator::new(MockConnector::default(), None)
            .connect_all(
                &servers(vec![("alpha", BackendConfig::default())]),
                &CancellationToken::new(),
            )
            .await
            .expect_err("stdio backend without command should fail");

        assert_eq!(
            err.to_string(),
            "server alpha: creating transport: Configuration error: stdio backend requires a command"
        );
    }

    #[tokio::test]
    async fn list_failure_closes_the_new_session_too() {
        let alpha = MockSession::with_tools(&["read"]);
        let beta = MockSession {
            list_error: Some("boom".into()),
            ..MockSession::default()
        };
        let (alpha_closes, beta_closes) = (closes(&alpha), closes(&beta));
        let orchestrator = MCPOrchestrator::new(
            MockConnector::default()
                .session("alpha", alpha)
                .session("beta", beta),
            None,
        );
        let err = orchestrator
            .connect_all(
                &servers(vec![("alpha", stdio_backend("alpha")), ("beta", stdio_backend("beta"))]),
                &CancellationToken::new(),
            )
            .await
            .expect_err("listing should fail");

        assert!(err.to_string().starts_with("server beta: "));
        assert!(err.to_string().contains("listing tools: "));
        assert_eq!(alpha_closes.load(Ordering::SeqCst), 1);
        assert_eq!(beta_closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconvertible_tool_rolls_back() {
        let bad = match json!({ "type": "string" }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let session = MockSession {
            tools: vec![Tool::new("odd", "odd tool", bad)],
            ..MockSession::default()
        };
        let session_closes = closes(&session);
        let orchestrator =
            MCPOrchestrator::new(MockConnector::default().session("alpha", session), None);
        let err = orchestrator
            .connect_all(
                &servers(vec![("alpha", stdio_backend("alpha"))]),
                &CancellationToken::new(),
            )
            .await
            .expect_err("non-object schema should fail");

        assert!(matches!(
            &err,
            BridgeError::Server { server, source }
            if server == "alpha" && source.to_string().starts_with("converting tool \"odd\"")
        ));
        assert_eq!(session_closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_opens_nothing() {
        let connector =
            MockConnector::default().session("alpha", MockSession::with_tools(&["read"]));
        let open_log = connector.open_log.clone();
        let ct = CancellationToken::new();
        ct.cancel();

        let err = MCPOrchestrator::new(connector, None)
            .connect_all(&servers(vec![("alpha", stdio_backend("alpha"))]), &ct)
            .await
            .expect_err("cancelled run should fail");
        assert!(matches!(err, BridgeError::Cancelled));
        assert!(open_log.lock().expect("open log lock").is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_run_closes_connected_sessions() {
        let ct = CancellationToken::new();
        let alpha = MockSession::with_tools(&["read"]);
        let alpha_closes = closes(&alpha);
        let connector = MockConnector::default()
            .session("alpha", alpha)
            .cancelling("beta", ct.clone())
            .session("gamma", MockSession::with_tools(&["write"]));
        let open_log = connector.open_log.clone();

        let err = MCPOrchestrator::new(connector, None)
            .connect_all(
                &servers(vec![
                    ("alpha", stdio_backend("alpha")),
                    ("beta", stdio_backend("beta")),
                    ("gamma", stdio_backend("gamma")),
                ]),
                &ct,
            )
            .await
            .expect_err("interrupted run should fail");

        assert!(matches!(err, BridgeError::Cancelled));
        assert_eq!(alpha_closes.load(Ordering::SeqCst), 1);
        assert_eq!(
            open_log.lock().expect("open log lock").as_slice(),
            &["alpha".to_string(), "beta".to_string()]
        );
    }

    #[tokio::test]
    async fn close_all_reports_every_failure_and_closes_everything() {
        let alpha = MockSession {
            close_error: Some("stuck".into()),
            ..MockSession::with_tools(&["a"])
        };
        let beta = MockSession::with_tools(&["b"]);
        let gamma = MockSession {
            close_error: Some("gone".into()),
            ..MockSession::with_tools(&["c"])
        };
        let counters = [closes(&alpha), closes(&beta), closes(&gamma)];
        let orchestrator = MCPOrchestrator::new(
            MockConnector::default()
                .session("alpha", alpha)
                .session("beta", beta)
                .session("gamma", gamma),
            None,
        );
        let state = orchestrator
            .connect_all(
                &servers(vec![
                    ("alpha", stdio_backend("alpha")),
                    ("beta", stdio_backend("beta")),
                    ("gamma", stdio_backend("gamma")),
                ]),
                &CancellationToken::new(),
            )
            .await
            .expect("all backends should connect");

        let err = state.close_all().await.expect_err("two closes fail");
        assert!(matches!(
            &err,
            BridgeError::Close(failures) if failures.len() == 2
                && failures[0].0 == "alpha"
                && failures[1].0 == "gamma"
        ));
        assert!(err.to_string().starts_with("errors closing MCP connections:"));
        for counter in counters {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn empty_config_yields_empty_state() {
        let state = MCPOrchestrator::new(MockConnector::default(), Some("sink".into()))
            .connect_all(&BTreeMap::new(), &CancellationToken::new())
            .await
            .expect("no backends is fine");
        assert!(state.is_empty());
        state.close_all().await.expect("nothing to close");
    }
}
