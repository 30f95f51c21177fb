use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─── Content blocks ───────────────────────────────────────────────────────────

/// A single content block inside an assistant or user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        /// Raw argument object as sent to the tool.
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking { thinking: thinking.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::ToolUse { id: id.into(), name: name.into(), input }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: Some(content.into()),
            is_error: false,
        }
    }

    pub fn tool_error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: Some(content.into()),
            is_error: true,
        }
    }
}

// ─── Messages ─────────────────────────────────────────────────────────────────

/// One message streamed from the SDK.
///
/// The stream for a single turn is a sequence of `Assistant` / `User` /
/// `System` messages terminated by exactly one `Result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SdkMessage {
    Assistant { content: Vec<ContentBlock> },
    User { content: Vec<ContentBlock> },
    System { subtype: String },
    Result(ResultInfo),
}

impl SdkMessage {
    /// Convenience: an assistant message with a single text block.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant { content: vec![ContentBlock::text(text)] }
    }
}

/// Token usage reported in the terminal [`SdkMessage::Result`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// The terminal message of a streamed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultInfo {
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub total_cost_usd: f64,
    pub session_id: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub result: Option<String>,
}

// ─── Query options ────────────────────────────────────────────────────────────

/// Tool permission handling for a spawned conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionMode {
    /// All tool calls run without prompting.
    #[default]
    #[serde(rename = "bypassPermissions")]
    Bypass,
    /// The SDK asks before each tool call.
    #[serde(rename = "ask")]
    Ask,
}

impl PermissionMode {
    /// Stable wire string as the SDK expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bypass => "bypassPermissions",
            Self::Ask => "ask",
        }
    }
}

/// Options for one `query` call.  Mirrors the SDK's option set one-to-one;
/// fields left `None` fall back to SDK defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub cwd: Option<PathBuf>,
    pub system_prompt: Option<String>,
    pub allowed_tools: Option<Vec<String>>,
    pub permission_mode: PermissionMode,
    pub model: Option<String>,
    pub max_output_tokens: Option<u32>,
    /// Session id from a previous turn; continues that conversation.
    pub resume: Option<String>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_mode_wire_strings() {
        assert_eq!(PermissionMode::Bypass.as_str(), "bypassPermissions");
        assert_eq!(PermissionMode::Ask.as_str(), "ask");
    }

    #[test]
    fn content_block_serialises_with_type_tag() {
        let b = ContentBlock::text("hi");
        let json = serde_json::to_string(&b).unwrap();
        assert!(json.contains("\"type\":\"text\""));
    }

    #[test]
    fn tool_use_round_trip() {
        let b = ContentBlock::tool_use("t1", "Read", serde_json::json!({"file_path": "/a"}));
        let json = serde_json::to_string(&b).unwrap();
        let back: ContentBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn tool_result_defaults_is_error_false() {
        let json = r#"{"type":"tool_result","tool_use_id":"t1","content":"ok"}"#;
        let b: ContentBlock = serde_json::from_str(json).unwrap();
        match b {
            ContentBlock::ToolResult { is_error, .. } => assert!(!is_error),
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn result_info_tolerates_missing_fields() {
        let json = r#"{"usage":{"input_tokens":5},"session_id":"s-1"}"#;
        let r: ResultInfo = serde_json::from_str(json).unwrap();
        assert_eq!(r.usage.input_tokens, 5);
        assert_eq!(r.usage.output_tokens, 0);
        assert_eq!(r.total_cost_usd, 0.0);
        assert!(!r.is_error);
    }
}
