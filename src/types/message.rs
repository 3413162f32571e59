//! Tool result messages handed back to the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The result of one tool call, in the agent's message representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultMessage {
    pub tool_call_id: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ToolResultMessage {
    /// Create a successful result from translated content blocks.
    pub fn success(tool_call_id: impl Into<String>, content: Vec<ContentBlock>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content,
            is_error: false,
            timestamp: Some(Utc::now()),
        }
    }

    /// Create an error-flagged result carrying a single text block.
    pub fn error_text(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: vec![ContentBlock::text(text)],
            is_error: true,
            timestamp: Some(Utc::now()),
        }
    }

    /// Concatenate all text blocks, one per line.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A single block of tool result content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image(ImageBlock),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Decoded image bytes with their declared media type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageBlock {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_is_flagged_and_tagged() {
        let message = ToolResultMessage::error_text("call-1", "boom");
        assert!(message.is_error);
        assert_eq!(message.tool_call_id, "call-1");
        assert_eq!(message.text(), "boom");
    }

    #[test]
    fn text_skips_images() {
        let message = ToolResultMessage::success(
            "call-2",
            vec![
                ContentBlock::text("first"),
                ContentBlock::Image(ImageBlock {
                    data: vec![1, 2, 3],
                    mime_type: "image/png".into(),
                }),
                ContentBlock::text("second"),
            ],
        );
        assert!(!message.is_error);
        assert_eq!(message.text(), "first\nsecond");
    }
}
