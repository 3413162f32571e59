//! Tool-calling interfaces shared by the bridge and the subagent server.

pub mod arguments;
pub mod tool;

pub use arguments::{decode_arguments, ToolArguments};
pub use tool::ToolCallback;
