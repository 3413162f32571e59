//! Agent-facing types produced by the bridge.

pub mod message;

pub use message::*;
