// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::Serialize;
use tokio::sync::mpsc;

/// Lifecycle and progress events emitted while agents run.
/// Consumers (progress bus, persistence, external adapters) subscribe to
/// these to drive their output.
///
/// Serialisation produces the external wire shape `{"type": …, "data": …}`
/// with stable snake_case kind strings.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentCreated {
        agent_id: String,
        name: String,
        role: String,
    },
    AgentStarted {
        agent_id: String,
    },
    AgentThinking {
        agent_id: String,
    },
    ToolCall {
        agent_id: String,
        tool: String,
    },
    AgentCompleted {
        agent_id: String,
        cost_usd: f64,
    },
    AgentFailed {
        agent_id: String,
        error: String,
    },
    AgentDeleted {
        agent_id: String,
    },
    TaskUpdate {
        task_id: String,
        status: String,
    },
    TaskDeleted {
        task_id: String,
    },
}

impl AgentEvent {
    /// The agent this event concerns, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::AgentCreated { agent_id, .. }
            | Self::AgentStarted { agent_id }
            | Self::AgentThinking { agent_id }
            | Self::ToolCall { agent_id, .. }
            | Self::AgentCompleted { agent_id, .. }
            | Self::AgentFailed { agent_id, .. }
            | Self::AgentDeleted { agent_id } => Some(agent_id),
            Self::TaskUpdate { .. } | Self::TaskDeleted { .. } => None,
        }
    }

    /// Event kind the external API adapter emits to its subscribers.
    pub fn wire_kind(&self) -> &'static str {
        match self {
            Self::AgentDeleted { .. } => "agent_deleted",
            Self::TaskUpdate { .. } => "task_update",
            Self::TaskDeleted { .. } => "task_deleted",
            _ => "agent_update",
        }
    }

    /// True for the terminal events of a session's initial task.  Every
    /// subscriber sees one of these last for any given agent.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AgentCompleted { .. } | Self::AgentFailed { .. })
    }
}

/// Producer half of a progress channel.  Unbounded so publication never
/// back-pressures a running session.
pub type ProgressSender = mpsc::UnboundedSender<AgentEvent>;

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_to_type_data_shape() {
        let e = AgentEvent::ToolCall { agent_id: "a1".into(), tool: "Read".into() };
        let v: serde_json::Value = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "tool_call");
        assert_eq!(v["data"]["tool"], "Read");
    }

    #[test]
    fn wire_kinds_are_stable() {
        let deleted = AgentEvent::AgentDeleted { agent_id: "a1".into() };
        assert_eq!(deleted.wire_kind(), "agent_deleted");
        let started = AgentEvent::AgentStarted { agent_id: "a1".into() };
        assert_eq!(started.wire_kind(), "agent_update");
        let task = AgentEvent::TaskUpdate { task_id: "t1".into(), status: "pending".into() };
        assert_eq!(task.wire_kind(), "task_update");
    }

    #[test]
    fn terminal_events_are_completed_and_failed_only() {
        assert!(AgentEvent::AgentCompleted { agent_id: "a".into(), cost_usd: 0.0 }.is_terminal());
        assert!(AgentEvent::AgentFailed { agent_id: "a".into(), error: "e".into() }.is_terminal());
        assert!(!AgentEvent::AgentStarted { agent_id: "a".into() }.is_terminal());
        assert!(!AgentEvent::AgentThinking { agent_id: "a".into() }.is_terminal());
    }
}
