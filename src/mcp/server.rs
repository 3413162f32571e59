//! Expose a subagent as a single-tool MCP server.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, JsonObject, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer, ServiceExt};
use rmcp::transport::IntoTransport;
use rmcp::ErrorData;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SubagentConfig;
use crate::error::{BridgeError, Result};
use crate::tools::decode_arguments;

use super::schema::{Schema, ToolDescriptor};

/// Error type returned by subagent executors.
pub type ExecutorError = Box<dyn std::error::Error + Send + Sync>;

/// Arguments accepted by the subagent tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubagentToolInput {
    /// The task or instruction for the subagent to execute.
    pub prompt: String,
    /// Optional file paths to include as context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
}

/// What an executor receives for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubagentInput {
    pub prompt: String,
    pub inputs: Vec<String>,
}

impl From<SubagentToolInput> for SubagentInput {
    fn from(input: SubagentToolInput) -> Self {
        Self {
            prompt: input.prompt,
            inputs: input.inputs,
        }
    }
}

/// Runs the subagent for one tool call.
///
/// Calls may run concurrently. `ct` fires when the client cancels the request.
#[async_trait]
pub trait SubagentExecutor: Send + Sync {
    async fn execute(
        &self,
        ct: CancellationToken,
        input: SubagentInput,
    ) -> std::result::Result<String, ExecutorError>;
}

/// Adapter returned by [`executor_fn`].
pub struct FnExecutor<F>(F);

/// Wrap an async closure as a [`SubagentExecutor`].
pub fn executor_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(CancellationToken, SubagentInput) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<String, ExecutorError>> + Send,
{
    FnExecutor(f)
}

#[async_trait]
impl<F, Fut> SubagentExecutor for FnExecutor<F>
where
    F: Fn(CancellationToken, SubagentInput) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<String, ExecutorError>> + Send,
{
    async fn execute(
        &self,
        ct: CancellationToken,
        input: SubagentInput,
    ) -> std::result::Result<String, ExecutorError> {
        (self.0)(ct, input).await
    }
}

/// An MCP server exposing one subagent tool.
pub struct MCPSubagentServer {
    tool: Tool,
    output_schema: Option<JsonObject>,
    executor: Arc<dyn SubagentExecutor>,
}

#[bon::bon]
impl MCPSubagentServer {
    /// Validate the configuration, load the output schema, and build the server.
    #[builder]
    pub fn new(
        config: SubagentConfig,
        executor: Option<Arc<dyn SubagentExecutor>>,
    ) -> Result<Self> {
        if config.name.is_empty() {
            return Err(BridgeError::Configuration("subagent name is required".into()));
        }
        if config.description.is_empty() {
            return Err(BridgeError::Configuration(
                "subagent description is required".into(),
            ));
        }
        let executor =
            executor.ok_or_else(|| BridgeError::Configuration("executor is required".into()))?;

        let output_schema = config
            .output_schema_path
            .as_deref()
            .map(load_output_schema)
            .transpose()?;

        let mut tool = ToolDescriptor {
            name: config.name,
            description: config.description,
            input_schema: subagent_input_schema(),
            output_schema: None,
        }
        .to_wire();
        tool.output_schema = output_schema.clone().map(Arc::new);

        Ok(Self {
            tool,
            output_schema,
            executor,
        })
    }
}

impl MCPSubagentServer {
    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    /// Serve over any rmcp server transport until `ct` fires or the peer goes away.
    pub async fn serve<T, E, A>(self, transport: T, ct: CancellationToken) -> Result<()>
    where
        T: IntoTransport<RoleServer, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let running = ServiceExt::serve_with_ct(self, transport, ct)
            .await
            .map_err(|e| BridgeError::Connection(format!("MCP server initialize failed: {e}")))?;
        let reason = running
            .waiting()
            .await
            .map_err(|e| BridgeError::Protocol(format!("MCP server task failed: {e}")))?;
        debug!(?reason, "MCP server stopped");
        Ok(())
    }

    /// Serve on this process's stdin/stdout.
    pub async fn serve_stdio(self, ct: CancellationToken) -> Result<()> {
        self.serve(rmcp::transport::stdio(), ct).await
    }

    /// Handle one call of the subagent tool. Never fails; faults are error results.
    pub(crate) async fn handle_call(
        &self,
        arguments: Option<JsonObject>,
        ct: CancellationToken,
    ) -> CallToolResult {
        let input: SubagentToolInput = match decode_arguments(arguments) {
            Ok(input) => input,
            Err(error) => return CallToolResult::error(vec![Content::text(error.to_string())]),
        };

        match std::panic::AssertUnwindSafe(self.dispatch(input.into(), ct))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(panic = %message, "subagent execution panicked");
                CallToolResult::error(vec![Content::text(format!(
                    "Subagent execution panicked: {message}"
                ))])
            }
        }
    }

    async fn dispatch(&self, input: SubagentInput, ct: CancellationToken) -> CallToolResult {
        if input.prompt.trim().is_empty() {
            return failure("prompt is required and cannot be empty");
        }
        if ct.is_cancelled() {
            return failure(BridgeError::Cancelled);
        }

        match self.executor.execute(ct.clone(), input).await {
            Ok(text) => self.success(text),
            Err(error) if ct.is_cancelled() => {
                failure(format!("execution cancelled or timed out: {error}"))
            }
            Err(error) => failure(error),
        }
    }

    fn success(&self, text: String) -> CallToolResult {
        if self.output_schema.is_some() {
            if let Ok(serde_json::Value::Object(structured)) =
                serde_json::from_str::<serde_json::Value>(&text)
            {
                return CallToolResult {
                    content: vec![Content::text(text)],
                    structured_content: Some(serde_json::Value::Object(structured)),
                    is_error: Some(false),
                    meta: None,
                };
            }
        }
        CallToolResult::success(vec![Content::text(text)])
    }
}

fn failure(detail: impl std::fmt::Display) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!(
        "Subagent execution failed: {detail}"
    ))])
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".into()
    }
}

fn subagent_input_schema() -> Schema {
    Schema::object()
        .property(
            "prompt",
            Schema::string().with_description("The task or instruction for the subagent to execute"),
            true,
        )
        .property(
            "inputs",
            Schema::array(Schema::string()).with_description(
                "Optional list of file paths to include as context for the subagent",
            ),
            false,
        )
}

fn load_output_schema(path: &Path) -> Result<JsonObject> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        BridgeError::Configuration(format!(
            "failed to read output schema file {:?}: {e}",
            path.display().to_string()
        ))
    })?;
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(serde_json::Value::Object(schema)) => Ok(schema),
        _ => Err(BridgeError::Configuration(format!(
            "output schema file {:?} contains invalid JSON",
            path.display().to_string()
        ))),
    }
}

impl ServerHandler for MCPSubagentServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").into(),
                title: Some("MCP Bridge Subagent Server".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                description: None,
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(vec![self.tool.clone()]))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        (name == self.tool.name).then(|| self.tool.clone())
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        if request.name != self.tool.name {
            return Err(ErrorData::invalid_params(
                format!("unknown tool {:?}", request.name),
                None,
            ));
        }
        debug!(tool = %request.name, "subagent tool called");
        Ok(self.handle_call(request.arguments, context.ct).await)
    }
}
