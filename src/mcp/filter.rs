//! Per-backend tool allow/deny filtering.

use std::collections::HashSet;
use std::fmt;

use rmcp::model::Tool;

use crate::config::BackendConfig;

use super::schema::ToolDescriptor;

/// Anything with a tool name that can be filtered.
pub trait NamedTool {
    fn tool_name(&self) -> &str;
}

impl<T: NamedTool + ?Sized> NamedTool for &T {
    fn tool_name(&self) -> &str {
        (**self).tool_name()
    }
}

impl NamedTool for Tool {
    fn tool_name(&self) -> &str {
        &self.name
    }
}

impl NamedTool for ToolDescriptor {
    fn tool_name(&self) -> &str {
        &self.name
    }
}

/// Which tools of a backend are exposed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolFilter {
    #[default]
    AllowAll,
    /// Keep only the named tools.
    Allow(Vec<String>),
    /// Keep everything except the named tools.
    Deny(Vec<String>),
}

/// How a filter is reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FilterMode {
    Whitelist,
    Blacklist,
    All,
}

impl ToolFilter {
    /// Infer the policy from a backend's `enabledTools` / `disabledTools`.
    pub fn from_config(config: &BackendConfig) -> Self {
        match (&config.enabled_tools, &config.disabled_tools) {
            (Some(allow), _) if !allow.is_empty() => Self::Allow(allow.clone()),
            (_, Some(deny)) if !deny.is_empty() => Self::Deny(deny.clone()),
            _ => Self::AllowAll,
        }
    }

    pub fn mode(&self) -> FilterMode {
        match self {
            Self::AllowAll => FilterMode::All,
            Self::Allow(_) => FilterMode::Whitelist,
            Self::Deny(_) => FilterMode::Blacklist,
        }
    }

    /// Whether a tool with this name passes the filter.
    pub fn permits(&self, name: &str) -> bool {
        match self {
            Self::AllowAll => true,
            Self::Allow(names) => names.iter().any(|n| n == name),
            Self::Deny(names) => !names.iter().any(|n| n == name),
        }
    }
}

/// Result of filtering one backend's tool list.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome<T> {
    /// Kept tools, in input order.
    pub retained: Vec<T>,
    /// Names of dropped tools, in input order.
    pub excluded: Vec<String>,
}

impl<T> FilterOutcome<T> {
    pub fn excluded_display(&self) -> String {
        self.excluded.join(", ")
    }
}

impl fmt::Display for ToolFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllowAll => write!(f, "all"),
            Self::Allow(names) => write!(f, "whitelist [{}]", names.join(", ")),
            Self::Deny(names) => write!(f, "blacklist [{}]", names.join(", ")),
        }
    }
}

/// Split `tools` into retained and excluded according to `filter`.
///
/// Names in an allow or deny list that match no tool are ignored.
pub fn filter_tools<T: NamedTool>(tools: Vec<T>, filter: &ToolFilter) -> FilterOutcome<T> {
    if let ToolFilter::AllowAll = filter {
        return FilterOutcome {
            retained: tools,
            excluded: Vec::new(),
        };
    }

    let listed: HashSet<&str> = match filter {
        ToolFilter::Allow(names) | ToolFilter::Deny(names) => {
            names.iter().map(String::as_str).collect()
        }
        ToolFilter::AllowAll => HashSet::new(),
    };
    let keep_listed = matches!(filter, ToolFilter::Allow(_));

    let mut retained = Vec::with_capacity(tools.len());
    let mut excluded = Vec::new();
    for tool in tools {
        if listed.contains(tool.tool_name()) == keep_listed {
            retained.push(tool);
        } else {
            excluded.push(tool.tool_name().to_owned());
        }
    }

    FilterOutcome { retained, excluded }
}
