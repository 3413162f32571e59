//! The callable-unit contract between the bridge and an agent loop.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::ToolResultMessage;

/// A tool the agent can invoke by handing over raw JSON arguments.
///
/// Implementations report ordinary failures (bad arguments, remote errors)
/// inside the returned message. `Err` is reserved for results that cannot be
/// represented at all.
#[async_trait]
pub trait ToolCallback: Send + Sync {
    /// Name the agent uses to call this tool.
    fn name(&self) -> &str;

    /// Invoke the tool once.
    async fn call(
        &self,
        arguments: &str,
        call_id: &str,
        ct: &CancellationToken,
    ) -> Result<ToolResultMessage>;
}
