// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

use flotilla_sdk::{ContentBlock, InferenceClient, QueryOptions, SdkMessage};

use crate::agent_log::AgentLogger;
use crate::events::{AgentEvent, ProgressSender};
use crate::types::{AgentConfig, AgentMetrics, AgentStatus, TaskResult, ToolCall};

/// Context window of the models we drive.
const MAX_CONTEXT_TOKENS: u64 = 200_000;

/// Context-window usage report.
#[derive(Debug, Clone, Serialize)]
pub struct ContextWindowUsage {
    pub total_tokens_used: u64,
    pub max_context_tokens: u64,
    pub usage_percentage: f64,
    pub estimated_remaining: u64,
    pub session_id: Option<String>,
}

/// Mutable session state, kept behind one short-lived lock so observers
/// (registry reads, the fleet monitor) never block on a running stream.
struct SessionState {
    status: AgentStatus,
    metrics: AgentMetrics,
    tool_calls: Vec<ToolCall>,
    session_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// One inference conversation treated as a disposable worker.
///
/// The session owns its config, status, metrics, and tool-call history, and
/// is itself owned exclusively by the [`AgentRegistry`](crate::AgentRegistry).
/// Driving the SDK stream happens on `&self`; all interior state is updated
/// under a mutex that is never held across an await point.
pub struct AgentSession {
    agent_id: String,
    config: AgentConfig,
    client: Arc<dyn InferenceClient>,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    logger: Mutex<AgentLogger>,
    progress: Mutex<Option<ProgressSender>>,
}

impl AgentSession {
    pub fn new(
        agent_id: impl Into<String>,
        config: AgentConfig,
        client: Arc<dyn InferenceClient>,
        logger: AgentLogger,
    ) -> Self {
        let session_id = config.session_id.clone();
        Self {
            agent_id: agent_id.into(),
            config,
            client,
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                status: AgentStatus::Created,
                metrics: AgentMetrics::default(),
                tool_calls: Vec::new(),
                session_id,
                started_at: None,
                completed_at: None,
            }),
            logger: Mutex::new(logger),
            progress: Mutex::new(None),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> AgentStatus {
        self.state.lock().unwrap().status
    }

    pub fn metrics(&self) -> AgentMetrics {
        self.state.lock().unwrap().metrics.clone()
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.state.lock().unwrap().tool_calls.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.lock().unwrap().session_id.clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().completed_at
    }

    /// Attach the progress channel this session reports through.  Events are
    /// delivered sequentially in emission order; the channel is unbounded so
    /// a slow consumer never stalls the stream.
    pub fn set_progress(&self, sender: ProgressSender) {
        *self.progress.lock().unwrap() = Some(sender);
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(sender) = self.progress.lock().unwrap().as_ref() {
            // A dropped receiver just means nobody is watching anymore.
            let _ = sender.send(event);
        }
    }

    // ── Task execution ────────────────────────────────────────────────────────

    /// Run one task to completion on a fresh SDK conversation.
    ///
    /// Never returns an error: any failure while opening or consuming the
    /// stream transitions the session to FAILED and is reported through the
    /// returned [`TaskResult`] (`success = false`, partial metrics kept).
    pub async fn execute_task(&self, task_prompt: &str) -> TaskResult {
        let start = Instant::now();
        {
            let mut state = self.state.lock().unwrap();
            state.status = AgentStatus::Running;
            state.started_at = Some(Utc::now());
        }
        self.emit(AgentEvent::AgentStarted { agent_id: self.agent_id.clone() });
        self.logger.lock().unwrap().log_prompt(task_prompt);

        let options = self.build_options();
        let mut stream = match self.client.query(task_prompt, options).await {
            Ok(s) => s,
            Err(e) => return self.fail_result(task_prompt, start, e),
        };

        let mut output = String::new();
        while let Some(item) = stream.next().await {
            let message = match item {
                Ok(m) => m,
                Err(e) => return self.fail_result(task_prompt, start, e),
            };
            self.logger.lock().unwrap().log_message(&message);
            self.ingest(&message, &mut output, true);
        }

        let (metrics, cost) = {
            let mut state = self.state.lock().unwrap();
            state.metrics.messages_sent += 1;
            state.metrics.execution_time_seconds += start.elapsed().as_secs_f64();
            state.status = AgentStatus::Completed;
            state.completed_at = Some(Utc::now());
            (state.metrics.clone(), state.metrics.total_cost_usd)
        };
        self.emit(AgentEvent::AgentCompleted {
            agent_id: self.agent_id.clone(),
            cost_usd: cost,
        });

        debug!(
            agent_id = %self.agent_id,
            tokens = metrics.total_tokens,
            cost_usd = metrics.total_cost_usd,
            "task complete"
        );

        TaskResult {
            agent_id: self.agent_id.clone(),
            task_description: task_prompt.to_string(),
            success: true,
            output,
            error: None,
            artifacts: metrics.files_written.clone(),
            metrics,
            timestamp: Utc::now(),
        }
    }

    /// Continuation turn on an existing conversation (same `session_id`).
    /// The session parks in WAITING afterwards, ready for the next message.
    pub async fn send_message(&self, message: &str) -> anyhow::Result<String> {
        {
            let mut state = self.state.lock().unwrap();
            state.status = AgentStatus::Running;
        }
        self.logger
            .lock()
            .unwrap()
            .log_prompt(&format!("[CONTINUE] {message}"));

        let options = self.build_options();
        let mut stream = self.client.query(message, options).await?;

        let mut output = String::new();
        while let Some(item) = stream.next().await {
            let message = item?;
            self.logger.lock().unwrap().log_message(&message);
            self.ingest(&message, &mut output, false);
        }

        let mut state = self.state.lock().unwrap();
        state.metrics.messages_sent += 1;
        state.status = AgentStatus::Waiting;
        Ok(output)
    }

    /// Interpret one streamed message.  `emit_events` is set for the initial
    /// task only; continuation turns track state without progress chatter.
    fn ingest(&self, message: &SdkMessage, output: &mut String, emit_events: bool) {
        match message {
            SdkMessage::Assistant { content } => {
                for block in content {
                    match block {
                        ContentBlock::Text { text } => output.push_str(text),
                        ContentBlock::Thinking { .. } => {
                            // Reasoning is logged but never captured in output.
                            if emit_events {
                                self.emit(AgentEvent::AgentThinking {
                                    agent_id: self.agent_id.clone(),
                                });
                            }
                        }
                        ContentBlock::ToolUse { name, input, .. } => {
                            self.track_tool_use(name, input);
                            if emit_events {
                                self.emit(AgentEvent::ToolCall {
                                    agent_id: self.agent_id.clone(),
                                    tool: name.clone(),
                                });
                            }
                        }
                        ContentBlock::ToolResult { content, is_error, .. } => {
                            self.track_tool_result(content.as_deref(), *is_error);
                        }
                    }
                }
            }
            SdkMessage::User { content } => {
                // Tool results ride on user messages in the SDK stream.
                for block in content {
                    if let ContentBlock::ToolResult { content, is_error, .. } = block {
                        self.track_tool_result(content.as_deref(), *is_error);
                    }
                }
            }
            SdkMessage::System { .. } => {}
            SdkMessage::Result(info) => {
                let mut state = self.state.lock().unwrap();
                state.metrics.add_usage(&info.usage);
                state.metrics.total_cost_usd += info.total_cost_usd;
                state.session_id = Some(info.session_id.clone());
            }
        }
    }

    fn track_tool_use(&self, name: &str, input: &serde_json::Value) {
        let mut state = self.state.lock().unwrap();
        state.tool_calls.push(ToolCall::new(name, input.clone()));
        state.metrics.tool_calls += 1;

        if let Some(path) = input.get("file_path").and_then(|v| v.as_str()) {
            match name {
                "Read" => state.metrics.record_file_read(path),
                "Write" | "Edit" => state.metrics.record_file_written(path),
                _ => {}
            }
        }
    }

    /// Attach a tool result to the most recent unresolved call (LIFO match).
    fn track_tool_result(&self, content: Option<&str>, is_error: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(call) = state.tool_calls.iter_mut().rev().find(|c| !c.is_resolved()) {
            call.result = Some(content.unwrap_or_default().to_string());
            call.success = !is_error;
            if is_error {
                call.error = Some(content.unwrap_or_default().to_string());
            }
        } else {
            warn!(agent_id = %self.agent_id, "tool result with no unresolved tool call");
        }
    }

    fn fail_result(&self, task_prompt: &str, start: Instant, error: anyhow::Error) -> TaskResult {
        let metrics = {
            let mut state = self.state.lock().unwrap();
            state.status = AgentStatus::Failed;
            state.completed_at = Some(Utc::now());
            state.metrics.execution_time_seconds += start.elapsed().as_secs_f64();
            state.metrics.clone()
        };
        let error_text = format!("{error:#}");
        warn!(agent_id = %self.agent_id, error = %error_text, "task failed");
        self.emit(AgentEvent::AgentFailed {
            agent_id: self.agent_id.clone(),
            error: error_text.clone(),
        });

        TaskResult {
            agent_id: self.agent_id.clone(),
            task_description: task_prompt.to_string(),
            success: false,
            output: String::new(),
            error: Some(error_text),
            metrics,
            artifacts: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn build_options(&self) -> QueryOptions {
        QueryOptions {
            cwd: self.config.working_directory.clone(),
            system_prompt: (!self.config.system_prompt.is_empty())
                .then(|| self.config.system_prompt.clone()),
            allowed_tools: self.config.allowed_tools.clone(),
            permission_mode: self.config.permission_mode,
            model: Some(self.config.model.clone()),
            max_output_tokens: Some(self.config.max_output_tokens),
            resume: self.session_id(),
        }
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Progress toward the model's context limit.
    pub fn context_window_usage(&self) -> ContextWindowUsage {
        let state = self.state.lock().unwrap();
        let used = state.metrics.total_tokens;
        ContextWindowUsage {
            total_tokens_used: used,
            max_context_tokens: MAX_CONTEXT_TOKENS,
            usage_percentage: (used as f64 / MAX_CONTEXT_TOKENS as f64) * 100.0,
            estimated_remaining: MAX_CONTEXT_TOKENS.saturating_sub(used),
            session_id: state.session_id.clone(),
        }
    }

    /// Snapshot of the agent's state and metrics for read APIs.
    pub fn summary(&self) -> serde_json::Value {
        let state = self.state.lock().unwrap();
        let m = &state.metrics;
        serde_json::json!({
            "agent_id": self.agent_id,
            "name": self.config.name,
            "role": self.config.role.as_str(),
            "status": state.status.as_str(),
            "model": self.config.model,
            "created_at": self.created_at.to_rfc3339(),
            "metrics": {
                "total_cost": format!("${:.4}", m.total_cost_usd),
                "total_tokens": m.total_tokens,
                "input_tokens": m.input_tokens,
                "output_tokens": m.output_tokens,
                "cache_creation_tokens": m.cache_creation_tokens,
                "cache_read_tokens": m.cache_read_tokens,
                "messages_sent": m.messages_sent,
                "tool_calls": m.tool_calls,
                "files_read": m.files_read.len(),
                "files_written": m.files_written.len(),
                "execution_time": format!("{:.2}s", m.execution_time_seconds),
            },
            "session_id": state.session_id,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Attempt a checked status transition.  Returns the previous status, or
    /// `Err(current)` when the transition is illegal.
    pub(crate) fn transition(&self, to: AgentStatus) -> Result<AgentStatus, AgentStatus> {
        let mut state = self.state.lock().unwrap();
        if state.status.can_transition(to) {
            let old = state.status;
            state.status = to;
            Ok(old)
        } else {
            Err(state.status)
        }
    }

    /// Release session resources: clears the SDK session id and the tool-call
    /// history, and parks the status at DELETED.
    pub fn cleanup(&self) {
        let mut state = self.state.lock().unwrap();
        state.status = AgentStatus::Deleted;
        state.session_id = None;
        state.tool_calls.clear();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
