//! Backend transports: what to open for each configured backend kind.
//!
//! Building a transport is pure. Nothing is spawned or dialed until
//! [`BackendTransport::connect`] runs the MCP handshake over it.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, DynService, RoleClient, RunningService, ServiceExt};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use tokio::process::Command;

use crate::config::{BackendConfig, BackendKind};
use crate::error::{BridgeError, Result};

mod sse;

pub use sse::{SseClientTransport, SseTransportError};

pub type DynClientService = Box<dyn DynService<RoleClient>>;
pub type MCPRunningService = RunningService<RoleClient, DynClientService>;

/// Environment variable carrying the event-sink address to stdio children.
pub const SINK_ADDRESS_ENV: &str = "CPE_SUBAGENT_LOGGING_ADDRESS";

/// A child process speaking MCP over stdin/stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Complete child environment; nothing else is inherited.
    pub env: BTreeMap<String, String>,
}

impl StdioSpec {
    /// The command to spawn. Stderr is inherited from this process.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stderr(Stdio::inherit());
        command
    }
}

/// A legacy HTTP+SSE endpoint.
#[derive(Debug, Clone)]
pub struct SseSpec {
    pub url: String,
    pub headers: HeaderMap,
}

/// A streamable HTTP endpoint.
#[derive(Debug, Clone)]
pub struct StreamableHttpSpec {
    pub url: String,
    pub headers: HeaderMap,
}

/// A ready-to-open connection description for one backend.
#[derive(Debug, Clone)]
pub enum BackendTransport {
    Stdio(StdioSpec),
    Sse(SseSpec),
    StreamableHttp(StreamableHttpSpec),
}

impl BackendTransport {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Stdio(_) => BackendKind::Stdio,
            Self::Sse(_) => BackendKind::Sse,
            Self::StreamableHttp(_) => BackendKind::Http,
        }
    }

    /// Open the transport and perform the MCP initialize handshake.
    pub async fn connect(
        self,
        client_info: ClientInfo,
    ) -> std::result::Result<MCPRunningService, ClientInitializeError> {
        match self {
            Self::Stdio(spec) => {
                let (transport, _stderr) = TokioChildProcess::builder(spec.command())
                    .stderr(Stdio::inherit())
                    .spawn()
                    .map_err(|error| {
                        ClientInitializeError::transport::<TokioChildProcess>(
                            error,
                            "spawn stdio transport",
                        )
                    })?;
                client_info.into_dyn().serve(transport).await
            }
            Self::Sse(spec) => {
                let transport = SseClientTransport::connect(&spec.url, spec.headers)
                    .await
                    .map_err(|error| {
                        ClientInitializeError::transport::<SseClientTransport>(
                            error,
                            "open sse transport",
                        )
                    })?;
                client_info.into_dyn().serve(transport).await
            }
            Self::StreamableHttp(spec) => {
                let custom_headers: HashMap<HeaderName, HeaderValue> = spec
                    .headers
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                let config = StreamableHttpClientTransportConfig::with_uri(spec.url)
                    .custom_headers(custom_headers);
                let transport = StreamableHttpClientTransport::from_config(config);
                client_info.into_dyn().serve(transport).await
            }
        }
    }
}

/// Build the transport for a backend using this process's environment.
pub fn build_transport(config: &BackendConfig, sink_address: Option<&str>) -> Result<BackendTransport> {
    build_transport_with_env(config, sink_address, std::env::vars())
}

/// Build the transport for a backend against an explicit inherited environment.
///
/// For stdio backends the child environment is `inherited`, extended with the
/// backend's `env`. [`SINK_ADDRESS_ENV`] is set to a non-empty sink address
/// and removed otherwise. Network kinds ignore the sink address.
pub fn build_transport_with_env(
    config: &BackendConfig,
    sink_address: Option<&str>,
    inherited: impl IntoIterator<Item = (String, String)>,
) -> Result<BackendTransport> {
    match config.kind {
        BackendKind::Stdio => {
            let program = config
                .command
                .clone()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| BridgeError::Configuration("stdio backend requires a command".into()))?;

            let mut env: BTreeMap<String, String> = inherited.into_iter().collect();
            env.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));
            match sink_address.filter(|addr| !addr.is_empty()) {
                Some(addr) => {
                    env.insert(SINK_ADDRESS_ENV.to_owned(), addr.to_owned());
                }
                None => {
                    env.remove(SINK_ADDRESS_ENV);
                }
            }

            Ok(BackendTransport::Stdio(StdioSpec {
                program,
                args: config.args.clone(),
                env,
            }))
        }
        BackendKind::Sse => Ok(BackendTransport::Sse(SseSpec {
            url: required_url(config)?,
            headers: header_map(&config.headers)?,
        })),
        BackendKind::Http => Ok(BackendTransport::StreamableHttp(StreamableHttpSpec {
            url: required_url(config)?,
            headers: header_map(&config.headers)?,
        })),
    }
}

fn required_url(config: &BackendConfig) -> Result<String> {
    config
        .url
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            BridgeError::Configuration(format!("{} backend requires a url", config.kind))
        })
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            BridgeError::Configuration(format!("invalid header name {name:?}: {e}"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            BridgeError::Configuration(format!("invalid value for header {name:?}: {e}"))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
