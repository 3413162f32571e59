//! Subagent executor that runs a configured command per call.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::SubagentConfig;
use crate::error::{BridgeError, Result};
use crate::mcp::server::{ExecutorError, SubagentExecutor, SubagentInput};

/// Runs `program args.. inputs..` with the prompt on stdin and returns stdout.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &SubagentConfig) -> Result<Self> {
        let program = config
            .command
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                BridgeError::Configuration("subagent command is required to serve".into())
            })?;
        Ok(Self::new(program, config.args.clone()))
    }
}

#[async_trait]
impl SubagentExecutor for CommandExecutor {
    async fn execute(
        &self,
        ct: CancellationToken,
        input: SubagentInput,
    ) -> std::result::Result<String, ExecutorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(&input.inputs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let prompt = input.prompt.into_bytes();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&prompt).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };

        // Feed stdin while stdout drains so a chatty child cannot fill both pipes.
        let run = async move {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            let output = output?;
            if let Err(error) = fed {
                if error.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(error);
                }
            }
            Ok(output)
        };

        let output = tokio::select! {
            _ = ct.cancelled() => return Err("subagent command cancelled".into()),
            output = run => output?,
        };
        if !output.status.success() {
            return Err(format!("subagent command exited with {}", output.status).into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
