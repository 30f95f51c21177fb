// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::Deserialize;
use tracing::{info, warn};

use flotilla_core::{
    prompts, AgentConfig, AgentRegistry, AgentRole, ExecutionMode, PlanError, Subtask, Task,
};

/// Keywords whose presence makes a task complex regardless of length.
const COMPLEX_KEYWORDS: [&str; 10] = [
    "refactor",
    "redesign",
    "migrate",
    "architecture",
    "research",
    "analyze",
    "investigate",
    "comprehensive",
    "system",
    "multiple",
];

/// Word-count threshold: descriptions at or above this are complex.
const SIMPLE_WORD_LIMIT: usize = 50;

/// Produces a [`Task`] plan from a description, either from the fixed
/// template catalog or by delegating to a one-shot planner agent.
#[derive(Default)]
pub struct TaskPlanner;

impl TaskPlanner {
    pub fn new() -> Self {
        Self
    }

    // ── Complexity heuristic ──────────────────────────────────────────────────

    /// `simple` iff the description is under the word limit AND mentions no
    /// complexity keyword; `complex` otherwise.
    pub fn estimate_complexity(description: &str) -> &'static str {
        let words = description.split_whitespace().count();
        let lower = description.to_lowercase();
        let has_keyword = COMPLEX_KEYWORDS.iter().any(|k| lower.contains(k));
        if words < SIMPLE_WORD_LIMIT && !has_keyword {
            "simple"
        } else {
            "complex"
        }
    }

    /// Roles suggested for an `auto` task, derived from keyword hits.
    pub fn suggested_roles(description: &str) -> Vec<AgentRole> {
        let lower = description.to_lowercase();
        let mut roles = Vec::new();
        let mut add = |role| {
            if !roles.contains(&role) {
                roles.push(role);
            }
        };

        if ["analyze", "research", "investigate", "understand"].iter().any(|k| lower.contains(k)) {
            add(AgentRole::Analyst);
        }
        if ["plan", "design"].iter().any(|k| lower.contains(k)) {
            add(AgentRole::Planner);
        }
        if ["implement", "build", "create", "add", "fix", "write"].iter().any(|k| lower.contains(k)) {
            add(AgentRole::Builder);
        }
        if lower.contains("test") {
            add(AgentRole::Tester);
        }
        if lower.contains("review") {
            add(AgentRole::Reviewer);
        }
        if lower.contains("document") {
            add(AgentRole::Documenter);
        }

        if roles.is_empty() {
            roles.push(AgentRole::Analyst);
        }
        roles
    }

    // ── Template catalog ──────────────────────────────────────────────────────

    /// Ordered role list for a known task type.
    pub fn template_roles(task_type: &str) -> Option<&'static [AgentRole]> {
        use AgentRole::*;
        Some(match task_type {
            "simple_implementation" | "simple_fix" => &[Builder, Tester],
            "feature_implementation" | "bug_fix" | "refactoring" => {
                &[Analyst, Planner, Builder, Tester, Reviewer]
            }
            "code_review" => &[Analyst, Planner, Reviewer, Tester],
            "documentation" => &[Analyst, Planner, Documenter, Reviewer],
            "testing" => &[Analyst, Tester, Reviewer],
            "investigation" => &[Analyst, Planner],
            _ => return None,
        })
    }

    /// Infer a template for a `custom` task from its description: simple
    /// tasks get the minimal builder/tester variants, complex ones the full
    /// pipeline that best matches their keywords.
    fn infer_task_type(description: &str) -> &'static str {
        let lower = description.to_lowercase();
        let is_fix = lower.contains("fix") || lower.contains("bug");
        if Self::estimate_complexity(description) == "simple" {
            if is_fix {
                return "simple_fix";
            }
            return "simple_implementation";
        }
        if is_fix {
            "bug_fix"
        } else if lower.contains("refactor") || lower.contains("redesign") {
            "refactoring"
        } else if lower.contains("document") {
            "documentation"
        } else if lower.contains("review") {
            "code_review"
        } else if lower.contains("test") {
            "testing"
        } else if ["investigate", "research", "analyze"].iter().any(|k| lower.contains(k)) {
            "investigation"
        } else {
            "feature_implementation"
        }
    }

    /// Build a plan from the template catalog.
    ///
    /// Explicit task types map straight to their template.  `custom` infers
    /// a template via the complexity heuristic; `auto` wraps the suggested
    /// roles as parallel subtasks.  Any other unknown type is a caller error
    /// surfaced before an agent is spawned.
    pub fn plan_task(
        &self,
        task_id: &str,
        description: &str,
        task_type: &str,
    ) -> Result<Task, PlanError> {
        if task_type == "auto" {
            let roles = Self::suggested_roles(description);
            return self.plan_parallel(task_id, description, &roles);
        }

        let complexity = Self::estimate_complexity(description);
        let effective = if task_type == "custom" {
            Self::infer_task_type(description).to_string()
        } else {
            task_type.to_string()
        };
        let roles = Self::template_roles(&effective)
            .ok_or_else(|| PlanError::UnknownTaskType(task_type.to_string()))?;

        let subtasks = roles
            .iter()
            .map(|&role| {
                let mut subtask = Subtask::new(role, role_step_description(role, description));
                subtask.context = role_step_context(role, description, complexity);
                subtask
            })
            .collect();

        let mut task = Task::new(task_id, description, effective.clone(), subtasks)?;
        task.metadata
            .insert("planner_mode".into(), "template".into());
        task.metadata.insert("complexity".into(), complexity.into());
        info!(
            task_id = %task_id,
            task_type = %effective,
            subtasks = task.subtasks.len(),
            "planned from template"
        );
        Ok(task)
    }

    /// Wrap one subtask per role, all parallel, each scoped to the raw
    /// description.
    pub fn plan_parallel(
        &self,
        task_id: &str,
        description: &str,
        roles: &[AgentRole],
    ) -> Result<Task, PlanError> {
        let subtasks = roles
            .iter()
            .map(|&role| {
                let mut subtask = Subtask::new(role, description);
                subtask.execution_mode = ExecutionMode::Parallel;
                subtask
            })
            .collect();
        let mut task = Task::new(task_id, description, "custom", subtasks)?;
        task.metadata
            .insert("planner_mode".into(), "parallel_roles".into());
        Ok(task)
    }

    // ── Delegating planner ────────────────────────────────────────────────────

    /// Ask a one-shot workflow-planner agent to design the plan.
    ///
    /// The agent must reply with the strict JSON contract; any violation
    /// (prose, missing fields, unknown roles, bad dependency indices) falls
    /// back to the template planner, with the reason recorded in the plan's
    /// metadata.  The planner agent is deleted before this returns.
    pub async fn plan_with_agent(
        &self,
        registry: &AgentRegistry,
        task_id: &str,
        description: &str,
        task_type: &str,
    ) -> Result<Task, PlanError> {
        let mut config = AgentConfig::new("Workflow Planner", AgentRole::Planner);
        config.system_prompt = prompts::workflow_planner_prompt().to_string();
        config.task_id = Some(task_id.to_string());
        let planner = registry.create(config);
        let planner_id = planner.agent_id().to_string();

        let result = planner.execute_task(description).await;
        registry.delete(&planner_id);

        let reply = if result.success {
            result.output
        } else {
            let reason = result.error.unwrap_or_else(|| "planner agent failed".into());
            return self.fallback(task_id, description, task_type, &reason);
        };

        match parse_planner_reply(&reply) {
            Ok(parsed) => match self.task_from_reply(task_id, description, task_type, parsed) {
                Ok(task) => Ok(task),
                Err(e) => self.fallback(task_id, description, task_type, &e.to_string()),
            },
            Err(reason) => self.fallback(task_id, description, task_type, &reason),
        }
    }

    fn fallback(
        &self,
        task_id: &str,
        description: &str,
        task_type: &str,
        reason: &str,
    ) -> Result<Task, PlanError> {
        warn!(task_id = %task_id, reason = %reason, "planner agent reply rejected; using template");
        let mut task = self.plan_task(task_id, description, task_type)?;
        task.metadata
            .insert("planner_mode".into(), "template_fallback".into());
        task.metadata
            .insert("fallback_reason".into(), reason.into());
        Ok(task)
    }

    fn task_from_reply(
        &self,
        task_id: &str,
        description: &str,
        task_type: &str,
        reply: PlannerReply,
    ) -> Result<Task, PlanError> {
        if reply.workflow.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut subtasks = Vec::with_capacity(reply.workflow.len());
        for step in &reply.workflow {
            let role = AgentRole::parse(&step.agent_role)
                .ok_or_else(|| PlanError::UnknownRole(step.agent_role.clone()))?;
            let mut subtask = Subtask::new(role, step.scope.clone());
            subtask.constraints = step.constraints.clone();
            subtask.execution_mode = if step.execution_mode == "parallel" {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Sequential
            };
            subtask.depends_on = step.depends_on.clone();
            subtask.estimated_tokens = step.estimated_tokens;
            subtasks.push(subtask);
        }

        let mut task = Task::new(task_id, description, task_type, subtasks)?;
        task.metadata.insert("planner_mode".into(), "delegated".into());
        task.metadata.insert("complexity".into(), reply.complexity.into());
        task.metadata.insert("rationale".into(), reply.rationale.into());
        task.metadata
            .insert("skip_reasoning".into(), reply.skip_reasoning.into());
        task.metadata.insert(
            "total_estimated_cost".into(),
            serde_json::json!(reply.total_estimated_cost),
        );
        info!(
            task_id = %task_id,
            subtasks = task.subtasks.len(),
            "planned by workflow-planner agent"
        );
        Ok(task)
    }
}

// ─── Planner-agent JSON contract ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PlannerReply {
    complexity: String,
    rationale: String,
    workflow: Vec<PlannedStep>,
    total_estimated_cost: f64,
    skip_reasoning: String,
}

#[derive(Debug, Deserialize)]
struct PlannedStep {
    agent_role: String,
    scope: String,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    estimated_tokens: u64,
    #[serde(default)]
    execution_mode: String,
    #[serde(default)]
    depends_on: Vec<usize>,
}

fn parse_planner_reply(reply: &str) -> Result<PlannerReply, String> {
    serde_json::from_str(reply.trim()).map_err(|e| format!("invalid planner JSON: {e}"))
}

// ─── Step text helpers ────────────────────────────────────────────────────────

fn role_step_description(role: AgentRole, description: &str) -> String {
    match role {
        AgentRole::Analyst => {
            format!("Research requirements and analyze the existing codebase for: {description}")
        }
        AgentRole::Planner => {
            format!("Create an implementation plan based on the analysis for: {description}")
        }
        AgentRole::Builder => format!("Implement, following the plan: {description}"),
        AgentRole::Tester => format!("Write and run tests for the work done on: {description}"),
        AgentRole::Reviewer => {
            format!("Review that the implementation meets the requirements of: {description}")
        }
        AgentRole::Documenter => format!("Write documentation for: {description}"),
        AgentRole::Orchestrator | AgentRole::Custom => description.to_string(),
    }
}

/// Role-specific system-prompt context: the analyst additionally receives
/// the task-keyword and complexity directives.
fn role_step_context(role: AgentRole, description: &str, complexity: &str) -> String {
    let mut context = format!("Overall task: {description}");
    if role == AgentRole::Analyst {
        if let Some(modifier) = prompts::task_modifier(description) {
            context.push_str(modifier);
        }
        context.push_str(prompts::complexity_modifier(complexity));
    }
    context
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
