use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flotilla_core::{AgentSession, Task};

/// Database record for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub name: String,
    pub role: String,
    pub model: String,
    pub status: String,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub messages_sent: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    /// Snapshot the current state of a live session.
    pub fn from_session(session: &AgentSession) -> Self {
        let metrics = session.metrics();
        let config = session.config();
        let status = session.status();
        Self {
            agent_id: session.agent_id().to_string(),
            name: config.name.clone(),
            role: config.role.as_str().to_string(),
            model: config.model.clone(),
            status: status.as_str().to_string(),
            total_cost: metrics.total_cost_usd,
            total_tokens: metrics.total_tokens,
            messages_sent: metrics.messages_sent,
            created_at: session.created_at(),
            completed_at: session.completed_at(),
            deleted_at: (status == flotilla_core::AgentStatus::Deleted).then(Utc::now),
        }
    }
}

/// Database record for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub description: String,
    pub task_type: String,
    pub status: String,
    /// JSON array of agent ids.
    pub assigned_agents: String,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// JSON-serialized aggregated result, when the task has one.
    pub result: Option<String>,
}

impl TaskRecord {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            description: task.description.clone(),
            task_type: task.task_type.clone(),
            status: task.status.as_str().to_string(),
            assigned_agents: serde_json::to_string(&task.assigned_agents)
                .unwrap_or_else(|_| "[]".into()),
            total_cost: task
                .result
                .as_ref()
                .map(|r| r.metrics.total_cost_usd)
                .unwrap_or(0.0),
            created_at: task.created_at,
            completed_at: task.completed_at,
            result: task
                .result
                .as_ref()
                .and_then(|r| serde_json::to_string(r).ok()),
        }
    }
}
