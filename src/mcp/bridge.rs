//! Bridge remote MCP tools into agent tool callbacks.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use rmcp::model::{CallToolResult, Content, RawContent, ResourceContents};
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::tools::{ToolArguments, ToolCallback};
use crate::types::{ContentBlock, ImageBlock, ToolResultMessage};

use super::client::ToolSession;

/// One remote tool, callable by an agent.
///
/// Bad arguments and remote failures come back as error-flagged results so
/// the agent can react to them. Each invocation makes exactly one remote call.
#[derive(Clone)]
pub struct MCPToolCallback {
    server: String,
    tool: String,
    session: Arc<dyn ToolSession>,
}

impl MCPToolCallback {
    pub fn new(
        server: impl Into<String>,
        tool: impl Into<String>,
        session: Arc<dyn ToolSession>,
    ) -> Self {
        Self {
            server: server.into(),
            tool: tool.into(),
            session,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn remote_error(&self, call_id: &str, error: impl std::fmt::Display) -> ToolResultMessage {
        ToolResultMessage::error_text(
            call_id,
            format!("Error calling MCP tool {}/{}: {error}", self.server, self.tool),
        )
    }
}

impl std::fmt::Debug for MCPToolCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MCPToolCallback")
            .field("server", &self.server)
            .field("tool", &self.tool)
            .finish()
    }
}

#[async_trait]
impl ToolCallback for MCPToolCallback {
    fn name(&self) -> &str {
        &self.tool
    }

    async fn call(
        &self,
        arguments: &str,
        call_id: &str,
        ct: &CancellationToken,
    ) -> Result<ToolResultMessage> {
        let arguments = match ToolArguments::parse(arguments) {
            Ok(arguments) => arguments,
            Err(error) => {
                return Ok(ToolResultMessage::error_text(
                    call_id,
                    format!("Error parsing parameters: {error}"),
                ))
            }
        };

        tracing::debug!(server = %self.server, tool = %self.tool, call_id, "calling MCP tool");
        let result = match self
            .session
            .call_tool(&self.tool, arguments.into_object(), ct)
            .await
        {
            Ok(result) => result,
            Err(error) => return Ok(self.remote_error(call_id, error)),
        };

        if result.is_error.unwrap_or(false) {
            let detail = remote_error_detail(&result);
            return Ok(self.remote_error(call_id, detail));
        }

        match translate_content(&self.tool, &result) {
            Ok(blocks) => Ok(ToolResultMessage::success(call_id, blocks)),
            Err(error @ BridgeError::UnsupportedContent { .. }) => Err(error),
            Err(error) => Ok(self.remote_error(call_id, error)),
        }
    }
}

fn remote_error_detail(result: &CallToolResult) -> String {
    let text = result
        .content
        .iter()
        .filter_map(|item| item.as_text().map(|t| t.text.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    if !text.is_empty() {
        return text;
    }
    result
        .structured_content
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "tool reported an error".into())
}

/// Map a successful result's content one-for-one into agent content blocks.
fn translate_content(tool: &str, result: &CallToolResult) -> Result<Vec<ContentBlock>> {
    if result.content.is_empty() {
        return Ok(result
            .structured_content
            .as_ref()
            .map(|value| vec![ContentBlock::text(value.to_string())])
            .unwrap_or_default());
    }

    result
        .content
        .iter()
        .map(|item| translate_item(tool, item))
        .collect()
}

fn translate_item(tool: &str, item: &Content) -> Result<ContentBlock> {
    match &item.raw {
        RawContent::Text(text) => Ok(ContentBlock::text(text.text.clone())),
        RawContent::Image(image) => {
            let data = base64::engine::general_purpose::STANDARD
                .decode(image.data.as_bytes())
                .map_err(|e| {
                    BridgeError::ToolExecution {
                        tool_name: tool.to_owned(),
                        message: format!("invalid base64 image data: {e}"),
                    }
                })?;
            Ok(ContentBlock::Image(ImageBlock {
                data,
                mime_type: image.mime_type.clone(),
            }))
        }
        RawContent::Resource(embedded) => match &embedded.resource {
            ResourceContents::TextResourceContents { text, .. } => {
                Ok(ContentBlock::text(text.clone()))
            }
            ResourceContents::BlobResourceContents { .. } => json_rendering(item),
        },
        RawContent::Audio(_) => json_rendering(item),
        RawContent::ResourceLink(_) => Err(BridgeError::UnsupportedContent {
            tool: tool.to_owned(),
            kind: "resource_link".into(),
        }),
    }
}

fn json_rendering(item: &Content) -> Result<ContentBlock> {
    Ok(ContentBlock::text(serde_json::to_string_pretty(item)?))
}
