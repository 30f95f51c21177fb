// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-agent file logging for SDK message streams.
//!
//! Each agent gets a dedicated directory under the log root:
//! `<root>/<task_id>/<agent_id[:8]>_<sanitized_name>_<YYYYMMDD_HHMMSS>/`
//! containing four append-only files:
//!
//! - `prompt.txt`   — the initial task prompt
//! - `text.txt`     — all text and thinking blocks, timestamped
//! - `tools.jsonl`  — tool calls and results, one JSON object per line
//! - `summary.jsonl` — system messages and the final result message
//!
//! Logging failures are warned and swallowed; the log sink never interrupts
//! a running session.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use flotilla_sdk::{ContentBlock, ResultInfo, SdkMessage};

/// Tool-result bodies larger than this are truncated in `tools.jsonl`.
const TOOL_RESULT_LIMIT: usize = 2_000;

pub struct AgentLogger {
    enabled: bool,
    log_dir: Option<PathBuf>,
    message_count: u64,
}

impl AgentLogger {
    /// Create the log directory for one agent.  When `enabled` is false (or
    /// directory creation fails) the logger becomes a no-op.
    pub fn new(
        agent_id: &str,
        agent_name: &str,
        log_root: &Path,
        enabled: bool,
        task_id: Option<&str>,
    ) -> Self {
        if !enabled {
            return Self { enabled: false, log_dir: None, message_count: 0 };
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let safe_name: String = agent_name
            .chars()
            .map(|c| if c == ' ' || c == '/' { '_' } else { c })
            .collect();
        let short_id: String = agent_id.chars().take(8).collect();
        let leaf = format!("{short_id}_{safe_name}_{timestamp}");

        let dir = match task_id {
            Some(task) => log_root.join(task).join(leaf),
            None => log_root.join(leaf),
        };

        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(error = %e, dir = %dir.display(), "agent log directory creation failed; logging disabled");
            return Self { enabled: false, log_dir: None, message_count: 0 };
        }

        Self { enabled: true, log_dir: Some(dir), message_count: 0 }
    }

    /// A disabled logger that writes nothing.
    pub fn disabled() -> Self {
        Self { enabled: false, log_dir: None, message_count: 0 }
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// Record the initial task prompt.
    pub fn log_prompt(&self, prompt: &str) {
        if !self.enabled {
            return;
        }
        if let Some(dir) = &self.log_dir {
            if let Err(e) = std::fs::write(dir.join("prompt.txt"), prompt) {
                warn!(error = %e, "failed to write prompt.txt");
            }
        }
    }

    /// Record one message from the SDK stream.
    pub fn log_message(&mut self, message: &SdkMessage) {
        if !self.enabled {
            return;
        }
        self.message_count += 1;

        match message {
            SdkMessage::Assistant { content } => {
                self.log_blocks("AssistantMessage", content)
            }
            SdkMessage::User { content } => self.log_blocks("UserMessage", content),
            SdkMessage::System { subtype } => {
                self.append_json(
                    "summary.jsonl",
                    serde_json::json!({
                        "timestamp": Utc::now().to_rfc3339(),
                        "type": "SystemMessage",
                        "subtype": subtype,
                    }),
                );
            }
            SdkMessage::Result(info) => self.log_result(info),
        }
    }

    fn log_blocks(&self, kind: &str, blocks: &[ContentBlock]) {
        for block in blocks {
            match block {
                ContentBlock::Text { text } => self.append_text(kind, text),
                ContentBlock::Thinking { thinking } => self.append_text("THINKING", thinking),
                ContentBlock::ToolUse { id, name, input } => {
                    self.append_json(
                        "tools.jsonl",
                        serde_json::json!({
                            "timestamp": Utc::now().to_rfc3339(),
                            "type": "tool_use",
                            "tool_name": name,
                            "tool_use_id": id,
                            "input": input,
                        }),
                    );
                }
                ContentBlock::ToolResult { tool_use_id, content, is_error } => {
                    let body = content.as_deref().unwrap_or("");
                    let truncated = if body.len() > TOOL_RESULT_LIMIT {
                        let cut = floor_char_boundary(body, TOOL_RESULT_LIMIT);
                        format!(
                            "{}... (truncated {} chars)",
                            &body[..cut],
                            body.len() - cut
                        )
                    } else {
                        body.to_string()
                    };
                    self.append_json(
                        "tools.jsonl",
                        serde_json::json!({
                            "timestamp": Utc::now().to_rfc3339(),
                            "type": "tool_result",
                            "tool_use_id": tool_use_id,
                            "content": truncated,
                            "is_error": is_error,
                        }),
                    );
                }
            }
        }
    }

    fn log_result(&self, info: &ResultInfo) {
        self.append_json(
            "summary.jsonl",
            serde_json::json!({
                "timestamp": Utc::now().to_rfc3339(),
                "type": "ResultMessage",
                "is_error": info.is_error,
                "result": info.result,
                "duration_ms": info.duration_ms,
                "num_turns": info.num_turns,
                "session_id": info.session_id,
                "total_cost_usd": info.total_cost_usd,
                "usage": {
                    "input_tokens": info.usage.input_tokens,
                    "output_tokens": info.usage.output_tokens,
                    "cache_creation_input_tokens": info.usage.cache_creation_input_tokens,
                    "cache_read_input_tokens": info.usage.cache_read_input_tokens,
                },
                "total_messages_processed": self.message_count,
            }),
        );
    }

    fn append_text(&self, kind: &str, content: &str) {
        self.append(
            "text.txt",
            &format!("[{}] {}:\n{}\n\n", Utc::now().to_rfc3339(), kind, content),
        );
    }

    fn append_json(&self, file: &str, value: serde_json::Value) {
        self.append(file, &format!("{value}\n"));
    }

    fn append(&self, file: &str, content: &str) {
        let Some(dir) = &self.log_dir else { return };
        let path = dir.join(file);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(content.as_bytes()));
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "agent log append failed");
        }
    }
}

/// Largest index `<= max` that is a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut i = max.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
