use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flotilla_sdk::{PermissionMode, Usage};

// ─── Roles and statuses ───────────────────────────────────────────────────────

/// Specialized agent roles.  Wire strings are lowercase and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Orchestrator,
    Planner,
    Builder,
    Reviewer,
    Analyst,
    Tester,
    Documenter,
    Custom,
}

impl AgentRole {
    pub const ALL: [AgentRole; 8] = [
        AgentRole::Orchestrator,
        AgentRole::Planner,
        AgentRole::Builder,
        AgentRole::Reviewer,
        AgentRole::Analyst,
        AgentRole::Tester,
        AgentRole::Documenter,
        AgentRole::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::Planner => "planner",
            Self::Builder => "builder",
            Self::Reviewer => "reviewer",
            Self::Analyst => "analyst",
            Self::Tester => "tester",
            Self::Documenter => "documenter",
            Self::Custom => "custom",
        }
    }

    /// Parse a role string case-insensitively.  The delegating planner's
    /// JSON contract uses uppercase enum names (`"BUILDER"`); CLI filters use
    /// lowercase.  Both resolve here.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orchestrator" => Some(Self::Orchestrator),
            "planner" => Some(Self::Planner),
            "builder" => Some(Self::Builder),
            "reviewer" => Some(Self::Reviewer),
            "analyst" => Some(Self::Analyst),
            "tester" => Some(Self::Tester),
            "documenter" => Some(Self::Documenter),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Display name used for auto-created specialized agents.
    pub fn agent_name(&self) -> String {
        let s = self.as_str();
        let mut chars = s.chars();
        let capitalised = match chars.next() {
            Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        format!("{capitalised} Agent")
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Created,
    Running,
    Waiting,
    Completed,
    Failed,
    Deleted,
}

impl AgentStatus {
    pub const ALL: [AgentStatus; 6] = [
        AgentStatus::Created,
        AgentStatus::Running,
        AgentStatus::Waiting,
        AgentStatus::Completed,
        AgentStatus::Failed,
        AgentStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }

    /// Legal state-machine transitions.
    ///
    /// `CREATED → RUNNING → {COMPLETED | FAILED}` for the initial task;
    /// a continuation turn re-enters RUNNING from COMPLETED or WAITING and
    /// settles in WAITING; deletion is reachable from every non-deleted state.
    pub fn can_transition(&self, to: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, to),
            (Created, Running)
                | (Created, Deleted)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Waiting)
                | (Completed, Running)
                | (Completed, Deleted)
                | (Waiting, Running)
                | (Waiting, Deleted)
                | (Failed, Deleted)
        )
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High-level task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Agent configuration ──────────────────────────────────────────────────────

/// Immutable configuration for one agent.  The only field that changes after
/// creation is `session_id`, which the session records after the first SDK
/// turn (kept in session state; the value here is just the initial seed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub role: AgentRole,
    pub model: String,
    pub system_prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub working_directory: Option<PathBuf>,
    pub allowed_tools: Option<Vec<String>>,
    pub permission_mode: PermissionMode,
    pub session_id: Option<String>,
    pub task_id: Option<String>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            name: name.into(),
            role,
            model: "claude-sonnet-4-5-20250929".into(),
            system_prompt: String::new(),
            max_output_tokens: 8192,
            temperature: 1.0,
            working_directory: None,
            allowed_tools: None,
            permission_mode: PermissionMode::Bypass,
            session_id: None,
            task_id: None,
        }
    }
}

// ─── Metrics ──────────────────────────────────────────────────────────────────

/// Performance and cost metrics for one agent.  All counters are
/// monotonically non-decreasing for the lifetime of the session, and
/// `total_tokens` always equals the sum of the four token counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub tool_calls: u64,
    pub messages_sent: u64,
    pub execution_time_seconds: f64,
    /// Files read, deduplicated, in order of first read.
    pub files_read: Vec<String>,
    /// Files written or edited, deduplicated, in order of first write.
    pub files_written: Vec<String>,
}

impl AgentMetrics {
    /// Fold one SDK usage report into the counters.
    pub fn add_usage(&mut self, usage: &Usage) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.cache_creation_tokens += usage.cache_creation_input_tokens;
        self.cache_read_tokens += usage.cache_read_input_tokens;
        self.recompute_total();
    }

    fn recompute_total(&mut self) {
        self.total_tokens = self.input_tokens
            + self.output_tokens
            + self.cache_creation_tokens
            + self.cache_read_tokens;
    }

    pub fn record_file_read(&mut self, path: impl Into<String>) {
        push_unique(&mut self.files_read, path.into());
    }

    pub fn record_file_written(&mut self, path: impl Into<String>) {
        push_unique(&mut self.files_written, path.into());
    }

    /// Component-wise sum for aggregation.  Counters add; file lists are
    /// concatenated then deduplicated in order of first appearance.
    pub fn merge(&mut self, other: &AgentMetrics) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.total_cost_usd += other.total_cost_usd;
        self.tool_calls += other.tool_calls;
        self.messages_sent += other.messages_sent;
        self.execution_time_seconds += other.execution_time_seconds;
        for f in &other.files_read {
            push_unique(&mut self.files_read, f.clone());
        }
        for f in &other.files_written {
            push_unique(&mut self.files_written, f.clone());
        }
        self.recompute_total();
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.iter().any(|x| x == &item) {
        list.push(item);
    }
}

// ─── Tool calls ───────────────────────────────────────────────────────────────

/// Record of one tool invocation observed on the SDK stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            result: None,
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// An unresolved call has not yet received its tool-result block.
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }
}

// ─── Task results ─────────────────────────────────────────────────────────────

/// Result from one agent's task execution (or an aggregate of several).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub agent_id: String,
    pub task_description: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub metrics: AgentMetrics,
    /// Files produced by the agent.
    pub artifacts: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

// ─── Plans ────────────────────────────────────────────────────────────────────

/// How a subtask is meant to run relative to its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

/// One unit of work in a plan, bound to a role and scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub role: AgentRole,
    pub description: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Prerequisite subtask indices; must all be smaller than this
    /// subtask's own index (acyclic by construction).
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub estimated_tokens: u64,
}

impl Subtask {
    pub fn new(role: AgentRole, description: impl Into<String>) -> Self {
        Self {
            role,
            description: description.into(),
            context: String::new(),
            constraints: Vec::new(),
            execution_mode: ExecutionMode::Sequential,
            depends_on: Vec::new(),
            estimated_tokens: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("subtask {index} depends on {dep}, which is not an earlier subtask")]
    ForwardDependency { index: usize, dep: usize },
    #[error("unknown agent role: {0}")]
    UnknownRole(String),
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),
    #[error("plan has no subtasks")]
    Empty,
}

/// A planned high-level task: the ordered/DAG-structured subtask list plus
/// the execution bookkeeping that accumulates while it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub description: String,
    pub task_type: String,
    pub subtasks: Vec<Subtask>,
    /// Agent ids created for this task, in creation order.  Cleaned up when
    /// the workflow finishes.
    #[serde(default)]
    pub assigned_agents: Vec<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    /// Workflow planning metadata (planner mode, fallback reason, estimates).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        description: impl Into<String>,
        task_type: impl Into<String>,
        subtasks: Vec<Subtask>,
    ) -> Result<Self, PlanError> {
        let task = Self {
            task_id: task_id.into(),
            description: description.into(),
            task_type: task_type.into(),
            subtasks,
            assigned_agents: Vec::new(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            metadata: HashMap::new(),
        };
        task.validate()?;
        Ok(task)
    }

    /// Enforce the index-acyclicity invariant on `depends_on`.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.subtasks.is_empty() {
            return Err(PlanError::Empty);
        }
        for (index, subtask) in self.subtasks.iter().enumerate() {
            for &dep in &subtask.depends_on {
                if dep >= index {
                    return Err(PlanError::ForwardDependency { index, dep });
                }
            }
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
