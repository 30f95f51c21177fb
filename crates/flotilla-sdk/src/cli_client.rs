// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use futures::stream;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    client::MessageStream, ContentBlock, QueryOptions, ResultInfo, SdkMessage, Usage,
};

/// Production client that drives the `claude` CLI as a subprocess.
///
/// The CLI is started in `--print --output-format stream-json` mode; each
/// stdout line is one JSON event which is mapped onto an [`SdkMessage`].
/// Authentication is whatever the CLI itself is logged in with — no keys
/// pass through this process.
pub struct CliClient {
    binary: String,
}

impl CliClient {
    pub fn new() -> Self {
        Self { binary: "claude".into() }
    }

    /// Override the binary name/path (e.g. an absolute path in CI).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn build_command(&self, prompt: &str, options: &QueryOptions) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--print")
            .arg("--verbose")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--permission-mode")
            .arg(options.permission_mode.as_str());

        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(model) = &options.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(system_prompt) = &options.system_prompt {
            cmd.arg("--system-prompt").arg(system_prompt);
        }
        if let Some(tools) = &options.allowed_tools {
            if !tools.is_empty() {
                cmd.arg("--allowed-tools").arg(tools.join(","));
            }
        }
        if let Some(session_id) = &options.resume {
            cmd.arg("--resume").arg(session_id);
        }
        cmd.arg(prompt);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for CliClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::InferenceClient for CliClient {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn query(&self, prompt: &str, options: QueryOptions) -> anyhow::Result<MessageStream> {
        let mut child = self
            .build_command(prompt, &options)
            .spawn()
            .with_context(|| format!("spawning {}", self.binary))?;

        let stdout = child
            .stdout
            .take()
            .context("child stdout not captured")?;

        // Reader task: one JSON event per line.  Lines that fail to parse
        // are skipped with a warning; the stream itself only errors when the
        // pipe breaks before a result event arrived.
        let (tx, rx) = mpsc::unbounded_channel::<anyhow::Result<SdkMessage>>();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut saw_result = false;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<RawEvent>(line) {
                            Ok(event) => {
                                if let Some(message) = event.into_message() {
                                    saw_result |= matches!(message, SdkMessage::Result(_));
                                    if tx.send(Ok(message)).is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                debug!(error = %e, "skipping unparseable stream line");
                            }
                        }
                    }
                    Ok(None) => {
                        if !saw_result {
                            let _ = tx.send(Err(anyhow::anyhow!(
                                "stream closed before result message"
                            )));
                        }
                        break;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(anyhow::Error::new(e).context("reading stream")));
                        break;
                    }
                }
            }
            // Reap the child so it does not linger as a zombie.
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(%status, "inference subprocess exited non-zero");
                }
                Err(e) => warn!(error = %e, "failed to wait on inference subprocess"),
                _ => {}
            }
        });

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

// ─── Wire format ──────────────────────────────────────────────────────────────
//
// The CLI's stream-json events.  Only the fields we consume are modelled;
// unknown fields and event types are ignored.

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEvent {
    System {
        #[serde(default)]
        subtype: String,
    },
    Assistant {
        message: RawMessage,
    },
    User {
        message: RawMessage,
    },
    Result {
        #[serde(default)]
        usage: Usage,
        #[serde(default)]
        total_cost_usd: f64,
        #[serde(default)]
        session_id: String,
        #[serde(default)]
        duration_ms: u64,
        #[serde(default)]
        num_turns: u32,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        result: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Vec<RawBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<serde_json::Value>,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

impl RawEvent {
    fn into_message(self) -> Option<SdkMessage> {
        match self {
            Self::System { subtype } => Some(SdkMessage::System { subtype }),
            Self::Assistant { message } => Some(SdkMessage::Assistant {
                content: message.content.into_iter().filter_map(RawBlock::into_block).collect(),
            }),
            Self::User { message } => Some(SdkMessage::User {
                content: message.content.into_iter().filter_map(RawBlock::into_block).collect(),
            }),
            Self::Result {
                usage,
                total_cost_usd,
                session_id,
                duration_ms,
                num_turns,
                is_error,
                result,
            } => Some(SdkMessage::Result(ResultInfo {
                usage,
                total_cost_usd,
                session_id,
                duration_ms,
                num_turns,
                is_error,
                result,
            })),
            Self::Unknown => None,
        }
    }
}

impl RawBlock {
    fn into_block(self) -> Option<ContentBlock> {
        match self {
            Self::Text { text } => Some(ContentBlock::Text { text }),
            Self::Thinking { thinking } => Some(ContentBlock::Thinking { thinking }),
            Self::ToolUse { id, name, input } => Some(ContentBlock::ToolUse { id, name, input }),
            Self::ToolResult { tool_use_id, content, is_error } => {
                // Tool results may carry a string or a structured array;
                // collapse both to text for tracking purposes.
                let content = content.map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                });
                Some(ContentBlock::ToolResult { tool_use_id, content, is_error })
            }
            Self::Unknown => None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assistant_text_event() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]}}"#;
        let event: RawEvent = serde_json::from_str(line).unwrap();
        match event.into_message().unwrap() {
            SdkMessage::Assistant { content } => {
                assert!(matches!(&content[0], ContentBlock::Text { text } if text == "hello"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_result_event_with_usage() {
        let line = r#"{"type":"result","subtype":"success","usage":{"input_tokens":12,"output_tokens":3,"cache_read_input_tokens":7},"total_cost_usd":0.02,"session_id":"abc","duration_ms":900,"num_turns":2,"is_error":false}"#;
        let event: RawEvent = serde_json::from_str(line).unwrap();
        match event.into_message().unwrap() {
            SdkMessage::Result(info) => {
                assert_eq!(info.usage.input_tokens, 12);
                assert_eq!(info.usage.cache_read_input_tokens, 7);
                assert_eq!(info.session_id, "abc");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_are_skipped() {
        let line = r#"{"type":"stream_event","payload":{}}"#;
        let event: RawEvent = serde_json::from_str(line).unwrap();
        assert!(event.into_message().is_none());
    }

    #[test]
    fn structured_tool_result_collapses_to_text() {
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":[{"type":"text","text":"out"}],"is_error":false}]}}"#;
        let event: RawEvent = serde_json::from_str(line).unwrap();
        match event.into_message().unwrap() {
            SdkMessage::User { content } => match &content[0] {
                ContentBlock::ToolResult { content: Some(c), .. } => {
                    assert!(c.contains("out"));
                }
                other => panic!("unexpected block: {other:?}"),
            },
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
