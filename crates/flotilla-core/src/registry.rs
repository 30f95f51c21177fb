// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use flotilla_config::Config;
use flotilla_sdk::InferenceClient;

use crate::agent_log::AgentLogger;
use crate::events::{AgentEvent, ProgressSender};
use crate::prompts;
use crate::session::AgentSession;
use crate::types::{AgentConfig, AgentRole, AgentStatus};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("agent not found: {0}")]
    NotFound(String),
    #[error("illegal status transition {from} → {to}")]
    IllegalTransition { from: AgentStatus, to: AgentStatus },
}

/// Fleet-wide statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSummary {
    pub total_agents: usize,
    pub active_agents: usize,
    pub by_status: HashMap<String, usize>,
    pub by_role: HashMap<String, usize>,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
}

/// Owns every live [`AgentSession`].
///
/// The `agent_id → session` map is the single source of truth for the fleet;
/// all mutations are serialized behind the registry's own lock, and callers
/// receive `Arc` handles for reads and execution only.  After `delete`
/// returns, the session is no longer reachable through the registry.
pub struct AgentRegistry {
    agents: Mutex<HashMap<String, Arc<AgentSession>>>,
    client: Arc<dyn InferenceClient>,
    working_directory: Option<PathBuf>,
    default_model: String,
    default_max_output_tokens: u32,
    log_root: PathBuf,
    logging_enabled: bool,
    progress: Mutex<Option<ProgressSender>>,
}

impl AgentRegistry {
    pub fn new(client: Arc<dyn InferenceClient>, config: &Config) -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
            client,
            working_directory: config.working_directory.clone(),
            default_model: config.model.clone(),
            default_max_output_tokens: config.max_output_tokens,
            log_root: config.logging.agent_log_dir.clone(),
            logging_enabled: config.logging.enabled,
            progress: Mutex::new(None),
        }
    }

    /// Attach the channel lifecycle events are published to.  New sessions
    /// inherit a clone so their progress flows to the same consumer.
    pub fn set_progress(&self, sender: ProgressSender) {
        *self.progress.lock().unwrap() = Some(sender);
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(sender) = self.progress.lock().unwrap().as_ref() {
            let _ = sender.send(event);
        }
    }

    // ── Create ────────────────────────────────────────────────────────────────

    /// Register a new agent in CREATED state and return its session handle.
    pub fn create(&self, mut config: AgentConfig) -> Arc<AgentSession> {
        let agent_id = Uuid::new_v4().to_string();

        if config.working_directory.is_none() {
            config.working_directory = self.working_directory.clone();
        }
        if config.model.is_empty() {
            config.model = self.default_model.clone();
        }
        if config.max_output_tokens == 0 {
            config.max_output_tokens = self.default_max_output_tokens;
        }

        let logger = AgentLogger::new(
            &agent_id,
            &config.name,
            &self.log_root,
            self.logging_enabled,
            config.task_id.as_deref(),
        );

        info!(
            agent_id = %agent_id,
            name = %config.name,
            role = %config.role,
            model = %config.model,
            "agent created"
        );

        let event = AgentEvent::AgentCreated {
            agent_id: agent_id.clone(),
            name: config.name.clone(),
            role: config.role.as_str().to_string(),
        };

        let session = Arc::new(AgentSession::new(
            agent_id.clone(),
            config,
            self.client.clone(),
            logger,
        ));
        if let Some(sender) = self.progress.lock().unwrap().as_ref() {
            session.set_progress(sender.clone());
        }

        self.agents.lock().unwrap().insert(agent_id, session.clone());
        self.emit(event);
        session
    }

    /// Create an agent with a role-specific system prompt.  `task_context`
    /// and `constraints` are folded into the prompt's context slot.
    pub fn create_specialized(
        &self,
        role: AgentRole,
        task_context: &str,
        constraints: &[String],
        task_id: Option<String>,
    ) -> Arc<AgentSession> {
        let mut system_prompt = prompts::role_prompt(role);
        if !task_context.is_empty() {
            system_prompt.push_str("\n\nTask context:\n");
            system_prompt.push_str(task_context);
        }
        if !constraints.is_empty() {
            system_prompt.push_str("\n\nConstraints:\n");
            for c in constraints {
                system_prompt.push_str("- ");
                system_prompt.push_str(c);
                system_prompt.push('\n');
            }
        }

        let mut config = AgentConfig::new(role.agent_name(), role);
        config.system_prompt = system_prompt;
        config.model = self.default_model.clone();
        config.max_output_tokens = self.default_max_output_tokens;
        config.task_id = task_id;
        self.create(config)
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentSession>> {
        self.agents.lock().unwrap().get(agent_id).cloned()
    }

    /// List sessions, optionally filtered by status and/or role.
    pub fn list(
        &self,
        status: Option<AgentStatus>,
        role: Option<AgentRole>,
    ) -> Vec<Arc<AgentSession>> {
        self.agents
            .lock()
            .unwrap()
            .values()
            .filter(|s| status.map_or(true, |want| s.status() == want))
            .filter(|s| role.map_or(true, |want| s.config().role == want))
            .cloned()
            .collect()
    }

    /// All non-deleted sessions.
    pub fn active(&self) -> Vec<Arc<AgentSession>> {
        self.agents
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status() != AgentStatus::Deleted)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.lock().unwrap().is_empty()
    }

    // ── Update ────────────────────────────────────────────────────────────────

    /// Apply a checked status transition and publish the matching event.
    pub fn update_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<(), RegistryError> {
        let session = self
            .get(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.to_string()))?;
        let old = session
            .transition(status)
            .map_err(|from| RegistryError::IllegalTransition { from, to: status })?;

        info!(agent_id = %agent_id, from = %old, to = %status, "agent status changed");
        let event = match status {
            AgentStatus::Running => Some(AgentEvent::AgentStarted {
                agent_id: agent_id.to_string(),
            }),
            AgentStatus::Completed => Some(AgentEvent::AgentCompleted {
                agent_id: agent_id.to_string(),
                cost_usd: session.metrics().total_cost_usd,
            }),
            AgentStatus::Failed => Some(AgentEvent::AgentFailed {
                agent_id: agent_id.to_string(),
                error: String::new(),
            }),
            _ => None,
        };
        if let Some(e) = event {
            self.emit(e);
        }
        Ok(())
    }

    // ── Delete ────────────────────────────────────────────────────────────────

    /// Delete an agent and free its resources.  Returns false when the id is
    /// unknown.  The session is removed from the map unconditionally.
    pub fn delete(&self, agent_id: &str) -> bool {
        let session = match self.agents.lock().unwrap().remove(agent_id) {
            Some(s) => s,
            None => return false,
        };
        let metrics = session.metrics();
        session.cleanup();
        info!(
            agent_id = %agent_id,
            total_cost_usd = metrics.total_cost_usd,
            total_tokens = metrics.total_tokens,
            "agent deleted"
        );
        self.emit(AgentEvent::AgentDeleted {
            agent_id: agent_id.to_string(),
        });
        true
    }

    /// Delete every agent.  Returns the number deleted.
    pub fn delete_all(&self) -> usize {
        let ids: Vec<String> = self.agents.lock().unwrap().keys().cloned().collect();
        ids.iter().filter(|id| self.delete(id)).count()
    }

    /// Delete all COMPLETED or FAILED agents.  Returns the number deleted.
    pub fn cleanup_completed(&self) -> usize {
        let ids: Vec<String> = self
            .agents
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| {
                matches!(s.status(), AgentStatus::Completed | AgentStatus::Failed)
            })
            .map(|(id, _)| id.clone())
            .collect();
        debug!(count = ids.len(), "cleaning up finished agents");
        ids.iter().filter(|id| self.delete(id)).count()
    }

    // ── Fleet metrics ─────────────────────────────────────────────────────────

    pub fn total_cost(&self) -> f64 {
        self.agents
            .lock()
            .unwrap()
            .values()
            .map(|s| s.metrics().total_cost_usd)
            .sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.agents
            .lock()
            .unwrap()
            .values()
            .map(|s| s.metrics().total_tokens)
            .sum()
    }

    /// Snapshot of the whole fleet.
    pub fn fleet_summary(&self) -> FleetSummary {
        let sessions: Vec<Arc<AgentSession>> =
            self.agents.lock().unwrap().values().cloned().collect();

        let mut by_status: HashMap<String, usize> = AgentStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_role: HashMap<String, usize> = AgentRole::ALL
            .iter()
            .map(|r| (r.as_str().to_string(), 0))
            .collect();

        let mut total_cost_usd = 0.0;
        let mut total_tokens = 0;
        let mut active = 0;
        for session in &sessions {
            let status = session.status();
            *by_status.entry(status.as_str().to_string()).or_insert(0) += 1;
            *by_role
                .entry(session.config().role.as_str().to_string())
                .or_insert(0) += 1;
            let m = session.metrics();
            total_cost_usd += m.total_cost_usd;
            total_tokens += m.total_tokens;
            if status != AgentStatus::Deleted {
                active += 1;
            }
        }

        FleetSummary {
            total_agents: sessions.len(),
            active_agents: active,
            by_status,
            by_role,
            total_cost_usd,
            total_tokens,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
