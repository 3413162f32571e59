use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, JsonObject, Tool};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::{BackendConfig, BackendKind};
use crate::error::{BridgeError, Result};

use super::client::{SessionConnector, ToolSession};
use super::transport::BackendTransport;

pub(crate) fn object_schema() -> JsonObject {
    match json!({ "type": "object", "properties": { "q": { "type": "string" } } }) {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

pub(crate) fn tool(name: &str) -> Tool {
    Tool::new(name.to_owned(), format!("{name} tool"), object_schema())
}

pub(crate) fn stdio_backend(command: &str) -> BackendConfig {
    BackendConfig::builder()
        .kind(BackendKind::Stdio)
        .command(command)
        .build()
}

#[derive(Default)]
pub(crate) struct MockSession {
    pub tools: Vec<Tool>,
    pub list_error: Option<String>,
    pub call_outcome: Option<std::result::Result<CallToolResult, String>>,
    pub close_error: Option<String>,
    pub list_calls: Arc<AtomicUsize>,
    pub call_calls: Arc<AtomicUsize>,
    pub close_calls: Arc<AtomicUsize>,
    pub call_log: Arc<StdMutex<Vec<(String, Option<JsonObject>)>>>,
}

impl MockSession {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names.iter().map(|name| tool(name)).collect(),
            ..Self::default()
        }
    }

    pub fn with_outcome(outcome: std::result::Result<CallToolResult, String>) -> Self {
        Self {
            call_outcome: Some(outcome),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ToolSession for MockSession {
    async fn list_tools(&self, _ct: &CancellationToken) -> Result<Vec<Tool>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match &self.list_error {
            Some(message) => Err(BridgeError::Protocol(message.clone())),
            None => Ok(self.tools.clone()),
        }
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        _ct: &CancellationToken,
    ) -> Result<CallToolResult> {
        self.call_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.call_log.lock() {
            log.push((name.to_owned(), arguments));
        }
        match &self.call_outcome {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(message)) => Err(BridgeError::Protocol(message.clone())),
            None => Ok(CallToolResult::success(Vec::new())),
        }
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        match &self.close_error {
            Some(message) => Err(BridgeError::Protocol(message.clone())),
            None => Ok(()),
        }
    }
}

/// Hands out pre-built sessions keyed by the stdio program name.
#[derive(Default)]
pub(crate) struct MockConnector {
    pub sessions: HashMap<String, Arc<MockSession>>,
    pub open_errors: HashMap<String, String>,
    pub cancel_on_open: HashMap<String, CancellationToken>,
    pub open_log: Arc<StdMutex<Vec<String>>>,
}

impl MockConnector {
    pub fn session(mut self, program: &str, session: MockSession) -> Self {
        self.sessions.insert(program.to_owned(), Arc::new(session));
        self
    }

    pub fn failing(mut self, program: &str, message: &str) -> Self {
        self.open_errors.insert(program.to_owned(), message.to_owned());
        self
    }

    /// Cancel `token` while `program` is opening, as a user interrupt would.
    pub fn cancelling(mut self, program: &str, token: CancellationToken) -> Self {
        self.cancel_on_open.insert(program.to_owned(), token);
        self
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn open(
        &self,
        transport: BackendTransport,
        _timeout: Duration,
        _ct: &CancellationToken,
    ) -> Result<Arc<dyn ToolSession>> {
        let program = match transport {
            BackendTransport::Stdio(spec) => spec.program,
            other => return Err(BridgeError::Connection(format!("unexpected {}", other.kind()))),
        };
        if let Ok(mut log) = self.open_log.lock() {
            log.push(program.clone());
        }
        if let Some(token) = self.cancel_on_open.get(&program) {
            token.cancel();
            return Err(BridgeError::Cancelled);
        }
        if let Some(message) = self.open_errors.get(&program) {
            return Err(BridgeError::Connection(message.clone()));
        }
        match self.sessions.get(&program) {
            Some(session) => Ok(session.clone()),
            None => Err(BridgeError::Connection(format!("no mock session for {program}"))),
        }
    }
}
