// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Core data model, agent sessions, and the fleet registry.

pub mod agent_log;
pub mod events;
pub mod prompts;
pub mod registry;
pub mod session;
pub mod types;

pub use events::{AgentEvent, ProgressSender};
pub use registry::{AgentRegistry, FleetSummary, RegistryError};
pub use session::{AgentSession, ContextWindowUsage};
pub use types::{
    AgentConfig, AgentMetrics, AgentRole, AgentStatus, ExecutionMode, PlanError, Subtask, Task,
    TaskResult, TaskStatus, ToolCall,
};
