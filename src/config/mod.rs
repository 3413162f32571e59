//! Bridge configuration: backend definitions, the optional subagent, and
//! loading from JSON or TOML files.
//!
//! Values may reference environment variables as `$VAR` or `${VAR}`; they are
//! expanded at load time, before validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use bon::Builder;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{BridgeError, Result};

/// File names searched by [`BridgeConfig::discover`], in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = [".mcpbridge.json", ".mcpbridge.toml"];

/// Timeout applied when a backend does not declare one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How a backend is reached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    /// Child process speaking JSON-RPC over stdin/stdout.
    #[default]
    #[serde(alias = "")]
    Stdio,
    /// Legacy HTTP+SSE transport.
    Sse,
    /// Streamable HTTP transport.
    Http,
}

/// One configured capability server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    #[serde(rename = "type", default)]
    #[builder(default)]
    pub kind: BackendKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[builder(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[builder(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_tools: Option<Vec<String>>,
}

impl BackendConfig {
    /// Effective request timeout; zero or unset falls back to [`DEFAULT_TIMEOUT`].
    pub fn timeout(&self) -> Duration {
        match self.timeout {
            Some(seconds) if seconds > 0 => Duration::from_secs(seconds as u64),
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// Check the kind-specific field requirements for the backend called `name`.
    pub fn validate(&self, name: &str) -> Result<()> {
        match self.kind {
            BackendKind::Stdio => {
                if self.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                    return Err(BridgeError::Configuration(format!(
                        "server {name:?} with type 'stdio' requires a 'command' field"
                    )));
                }
                if !self.headers.is_empty() {
                    return Err(BridgeError::Configuration(format!(
                        "server {name:?} has type 'stdio' but specifies headers (only valid for sse and http servers)"
                    )));
                }
                if self.env.keys().any(|key| key.is_empty()) {
                    return Err(BridgeError::Configuration(format!(
                        "server {name:?} has an empty environment variable name"
                    )));
                }
            }
            BackendKind::Sse | BackendKind::Http => {
                if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return Err(BridgeError::Configuration(format!(
                        "server {name:?} with type '{}' requires a 'url' field",
                        self.kind
                    )));
                }
                if !self.env.is_empty() {
                    return Err(BridgeError::Configuration(format!(
                        "server {name:?} has type '{}' but specifies environment variables (only valid for stdio servers)",
                        self.kind
                    )));
                }
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout < 0 {
                return Err(BridgeError::Configuration(format!(
                    "server {name:?} has invalid timeout {timeout} (must not be negative)"
                )));
            }
        }

        match (&self.enabled_tools, &self.disabled_tools) {
            (Some(_), Some(_)) => Err(BridgeError::Configuration(format!(
                "server {name:?} cannot specify both 'enabledTools' and 'disabledTools'"
            ))),
            (Some(list), None) if list.is_empty() => Err(BridgeError::Configuration(format!(
                "server {name:?} has an empty 'enabledTools' list"
            ))),
            (None, Some(list)) if list.is_empty() => Err(BridgeError::Configuration(format!(
                "server {name:?} has an empty 'disabledTools' list"
            ))),
            _ => Ok(()),
        }
    }

    fn expand_environment(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        self.command = self.command.as_deref().map(|c| expand_env(c, lookup));
        self.args = self.args.iter().map(|a| expand_env(a, lookup)).collect();
        self.url = self.url.as_deref().map(|u| expand_env(u, lookup));
        self.env = expand_map(&self.env, lookup);
        self.headers = expand_map(&self.headers, lookup);
    }
}

/// The capability exposed by `serve`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentConfig {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema_path: Option<PathBuf>,
    /// Program run by the CLI executor for each call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, BackendConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagent: Option<SubagentConfig>,
}

/// Supported on-disk formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick a format from a file extension; anything but `.toml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

impl BridgeConfig {
    /// Parse, expand and validate a configuration document.
    pub fn parse(raw: &str, format: ConfigFormat) -> Result<Self> {
        let mut config: Self = match format {
            ConfigFormat::Json => serde_json::from_str(raw)?,
            ConfigFormat::Toml => toml::from_str(raw)?,
        };
        config.expand_environment(&|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, choosing the format by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Configuration(format!("error reading config file {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "loading MCP bridge config");
        Self::parse(&raw, ConfigFormat::from_path(path))
    }

    /// Load the first config file found in the current directory, then the home directory.
    pub fn discover() -> Result<Self> {
        let path = discover_config_path().ok_or_else(|| {
            BridgeError::Configuration(
                "MCP config file not found in current directory or home directory".into(),
            )
        })?;
        Self::load(path)
    }

    /// Validate every backend and the subagent section.
    pub fn validate(&self) -> Result<()> {
        for (name, server) in &self.mcp_servers {
            server.validate(name)?;
        }
        if let Some(subagent) = &self.subagent {
            if subagent.name.trim().is_empty() {
                return Err(BridgeError::Configuration("subagent name is required".into()));
            }
            if subagent.description.trim().is_empty() {
                return Err(BridgeError::Configuration(
                    "subagent description is required".into(),
                ));
            }
        }
        Ok(())
    }

    /// Expand `$VAR` / `${VAR}` references using `lookup`.
    pub fn expand_environment(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        for server in self.mcp_servers.values_mut() {
            server.expand_environment(lookup);
        }
        if let Some(subagent) = &mut self.subagent {
            subagent.output_schema_path = subagent
                .output_schema_path
                .as_ref()
                .map(|p| PathBuf::from(expand_env(&p.to_string_lossy(), lookup)));
            subagent.command = subagent.command.as_deref().map(|c| expand_env(c, lookup));
            subagent.args = subagent.args.iter().map(|a| expand_env(a, lookup)).collect();
        }
    }
}

fn discover_config_path() -> Option<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(user_dirs) = directories::UserDirs::new() {
        dirs.push(user_dirs.home_dir().to_path_buf());
    }
    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

fn env_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("env reference pattern is valid")
    })
}

/// Expand `$VAR` and `${VAR}`; unknown variables become empty strings.
pub fn expand_env(value: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    env_reference()
        .replace_all(value, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}

fn expand_map(
    map: &BTreeMap<String, String>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| (expand_env(k, lookup), expand_env(v, lookup)))
        .collect()
}
