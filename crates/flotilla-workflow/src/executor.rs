// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use flotilla_core::{
    AgentRegistry, AgentSession, PlanError, Subtask, Task, TaskResult,
};
use flotilla_observe::MetricsCollector;

use crate::context::{distill, AgentContext};

/// Tick for the dependency-completion poll.
const DEPENDENCY_POLL: Duration = Duration::from_millis(100);

/// Runs a planned [`Task`] by materializing its subtasks into live agent
/// sessions under one of three strategies: sequential (distilled context
/// threaded forward), parallel (fully independent), or dependency-ordered.
///
/// The executor owns agent creation and cleanup for the task; agents are
/// retained for observability until [`cleanup_workflow_agents`] runs.
///
/// [`cleanup_workflow_agents`]: WorkflowExecutor::cleanup_workflow_agents
pub struct WorkflowExecutor {
    registry: Arc<AgentRegistry>,
    metrics: Arc<MetricsCollector>,
    /// Distilled contexts of completed agents, kept until plan cleanup for
    /// feedback loops and non-sequential access.  Shared with the
    /// dependency-mode worker tasks.
    contexts: Arc<Mutex<HashMap<String, AgentContext>>>,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<AgentRegistry>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            registry,
            metrics,
            contexts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The distilled context a completed agent produced, if any.
    pub fn context_for(&self, agent_id: &str) -> Option<AgentContext> {
        self.contexts.lock().unwrap().get(agent_id).cloned()
    }

    // ── Sequential ────────────────────────────────────────────────────────────

    /// Execute subtasks in index order, passing each agent the *distilled*
    /// forward context of its predecessor — never the raw output.  A failed
    /// subtask clears the context; downstream agents then see only their own
    /// description.
    pub async fn execute_sequential(&self, task: &mut Task) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(task.subtasks.len());
        let mut previous: Option<AgentContext> = None;

        let subtasks = task.subtasks.clone();
        for (index, subtask) in subtasks.iter().enumerate() {
            let session = self.spawn_agent(task, subtask);
            debug!(
                task_id = %task.task_id,
                step = index + 1,
                total = subtasks.len(),
                role = %subtask.role,
                "sequential step starting"
            );

            let mut prompt = subtask.description.clone();
            if let Some(context) = &previous {
                let forward = context.forward_context();
                if !forward.is_empty() {
                    prompt.push_str("\n\n");
                    prompt.push_str(&forward);
                }
            }

            let result = session.execute_task(&prompt).await;
            self.record_completion(&session, &subtask.description, &result);

            previous = if result.success && !result.output.is_empty() {
                let context = distill(&result.output, subtask.role);
                self.contexts
                    .lock()
                    .unwrap()
                    .insert(session.agent_id().to_string(), context.clone());
                Some(context)
            } else {
                None
            };

            results.push(result);
        }

        results
    }

    // ── Parallel ──────────────────────────────────────────────────────────────

    /// Create one agent per subtask up front, then run them all concurrently.
    /// Each agent sees only its own description; siblings are never cancelled
    /// on failure.  Results come back in subtask-index order.
    pub async fn execute_parallel(&self, task: &mut Task) -> Vec<TaskResult> {
        let mut agents: Vec<(Arc<AgentSession>, Subtask)> = Vec::new();
        for subtask in task.subtasks.clone() {
            let session = self.spawn_agent(task, &subtask);
            agents.push((session, subtask));
        }
        info!(
            task_id = %task.task_id,
            agents = agents.len(),
            "parallel fan-out starting"
        );

        let handles: Vec<JoinHandle<TaskResult>> = agents
            .iter()
            .map(|(session, subtask)| {
                let session = session.clone();
                let prompt = subtask.description.clone();
                tokio::spawn(async move { session.execute_task(&prompt).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (handle, (session, subtask)) in handles.into_iter().zip(&agents) {
            let result = match handle.await {
                Ok(result) => result,
                // Join errors (panics) become synthetic failed results with
                // whatever metrics the session captured before dying.
                Err(e) => TaskResult {
                    agent_id: session.agent_id().to_string(),
                    task_description: subtask.description.clone(),
                    success: false,
                    output: String::new(),
                    error: Some(format!("task join error: {e}")),
                    metrics: session.metrics(),
                    artifacts: Vec::new(),
                    timestamp: chrono::Utc::now(),
                },
            };
            self.record_completion(session, &subtask.description, &result);
            results.push(result);
        }

        results
    }

    // ── Dependency DAG ────────────────────────────────────────────────────────

    /// Execute subtasks respecting explicit dependencies.  Each subtask waits
    /// for its prerequisites (both `Subtask::depends_on` and the extra
    /// `dependencies` map), then runs with the concatenated forward contexts
    /// of those prerequisites in prerequisite-index order.  Results are
    /// returned in subtask-index order.
    pub async fn execute_with_dependencies(
        &self,
        task: &mut Task,
        dependencies: &HashMap<usize, Vec<usize>>,
    ) -> Result<Vec<TaskResult>, PlanError> {
        // No cycles: every dependency must point at an earlier subtask.
        for (index, subtask) in task.subtasks.iter().enumerate() {
            let extra = dependencies.get(&index).cloned().unwrap_or_default();
            for dep in subtask.depends_on.iter().chain(extra.iter()) {
                if *dep >= index {
                    return Err(PlanError::ForwardDependency { index, dep: *dep });
                }
            }
        }

        let completed: Arc<Mutex<HashSet<usize>>> = Arc::new(Mutex::new(HashSet::new()));
        let contexts_by_index: Arc<Mutex<HashMap<usize, AgentContext>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let assigned: Arc<Mutex<Vec<(usize, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let results: Arc<Mutex<HashMap<usize, TaskResult>>> = Arc::new(Mutex::new(HashMap::new()));

        let mut handles = Vec::with_capacity(task.subtasks.len());
        for (index, subtask) in task.subtasks.clone().into_iter().enumerate() {
            let mut deps: Vec<usize> = subtask.depends_on.clone();
            for extra in dependencies.get(&index).cloned().unwrap_or_default() {
                if !deps.contains(&extra) {
                    deps.push(extra);
                }
            }
            deps.sort_unstable();

            let registry = self.registry.clone();
            let task_id = task.task_id.clone();
            let completed = completed.clone();
            let contexts_by_index = contexts_by_index.clone();
            let assigned = assigned.clone();
            let results = results.clone();
            let contexts = self.contexts.clone();
            let metrics = self.metrics.clone();

            handles.push(tokio::spawn(async move {
                // Wait until every prerequisite has finished.
                loop {
                    {
                        let done = completed.lock().unwrap();
                        if deps.iter().all(|d| done.contains(d)) {
                            break;
                        }
                    }
                    tokio::time::sleep(DEPENDENCY_POLL).await;
                }

                // Gather prerequisite contexts in index order.
                let dep_contexts: Vec<String> = {
                    let map = contexts_by_index.lock().unwrap();
                    deps.iter()
                        .filter_map(|d| map.get(d).map(|c| c.forward_context()))
                        .filter(|c| !c.is_empty())
                        .collect()
                };

                let session = registry.create_specialized(
                    subtask.role,
                    &subtask.context,
                    &subtask.constraints,
                    Some(task_id),
                );
                assigned
                    .lock()
                    .unwrap()
                    .push((index, session.agent_id().to_string()));

                let mut prompt = subtask.description.clone();
                if !dep_contexts.is_empty() {
                    prompt.push_str("\n\nContext from previous tasks:\n");
                    prompt.push_str(&dep_contexts.join("\n\n"));
                }

                let result = session.execute_task(&prompt).await;
                metrics.record_agent_metrics(session.agent_id(), result.metrics.clone());
                metrics.record_event(
                    "task_completed",
                    serde_json::json!({
                        "agent_id": session.agent_id(),
                        "task": subtask.description,
                        "success": result.success,
                    }),
                );

                if result.success && !result.output.is_empty() {
                    let context = distill(&result.output, subtask.role);
                    contexts_by_index.lock().unwrap().insert(index, context.clone());
                    contexts
                        .lock()
                        .unwrap()
                        .insert(session.agent_id().to_string(), context);
                }

                results.lock().unwrap().insert(index, result);
                completed.lock().unwrap().insert(index);
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "dependency subtask join failed");
            }
        }

        // Record created agents on the task in index order.
        let mut created = assigned.lock().unwrap().clone();
        created.sort_unstable_by_key(|(index, _)| *index);
        task.assigned_agents
            .extend(created.into_iter().map(|(_, id)| id));

        let mut ordered = Vec::with_capacity(task.subtasks.len());
        let mut map = results.lock().unwrap();
        for index in 0..task.subtasks.len() {
            if let Some(result) = map.remove(&index) {
                ordered.push(result);
            }
        }
        Ok(ordered)
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────

    /// Delete every agent created for this task.  Returns the number
    /// successfully deleted.  Distilled contexts for those agents are
    /// released as well; they are only guaranteed to live until the plan
    /// completes.
    pub fn cleanup_workflow_agents(&self, task: &Task) -> usize {
        let mut contexts = self.contexts.lock().unwrap();
        let mut count = 0;
        for agent_id in &task.assigned_agents {
            contexts.remove(agent_id);
            if self.registry.delete(agent_id) {
                count += 1;
            }
        }
        info!(task_id = %task.task_id, deleted = count, "workflow agents cleaned up");
        count
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn spawn_agent(&self, task: &mut Task, subtask: &Subtask) -> Arc<AgentSession> {
        let session = self.registry.create_specialized(
            subtask.role,
            &subtask.context,
            &subtask.constraints,
            Some(task.task_id.clone()),
        );
        task.assigned_agents.push(session.agent_id().to_string());
        session
    }

    fn record_completion(&self, session: &AgentSession, description: &str, result: &TaskResult) {
        self.metrics
            .record_agent_metrics(session.agent_id(), result.metrics.clone());
        self.metrics.record_event(
            "task_completed",
            serde_json::json!({
                "agent_id": session.agent_id(),
                "task": description,
                "success": result.success,
            }),
        );
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex as StdMutex;

    use flotilla_core::{AgentRole, ExecutionMode};
    use flotilla_sdk::{
        InferenceClient, MessageStream, QueryOptions, ScriptedClient, SdkMessage,
    };

    /// Routes each query to a script keyed by a substring of the prompt.
    /// Parallel execution makes call order nondeterministic, so the trick of
    /// popping scripts in order does not work here.
    struct KeyedClient {
        routes: Vec<(&'static str, Vec<Result<SdkMessage, String>>)>,
        /// Every prompt seen, in arrival order.
        pub prompts: StdMutex<Vec<String>>,
    }

    impl KeyedClient {
        fn new(routes: Vec<(&'static str, Vec<Result<SdkMessage, String>>)>) -> Self {
            Self { routes, prompts: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl InferenceClient for KeyedClient {
        fn name(&self) -> &str {
            "keyed-mock"
        }

        async fn query(
            &self,
            prompt: &str,
            _options: QueryOptions,
        ) -> anyhow::Result<MessageStream> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let script = self
                .routes
                .iter()
                .find(|(key, _)| prompt.contains(key))
                .map(|(_, script)| script.clone())
                .unwrap_or_else(|| ScriptedClient::text_script("unmatched", 0.0));
            let wrapped: Vec<anyhow::Result<SdkMessage>> = script
                .into_iter()
                .map(|item| item.map_err(anyhow::Error::msg))
                .collect();
            Ok(Box::pin(stream::iter(wrapped)))
        }
    }

    fn harness(client: Arc<dyn InferenceClient>) -> (Arc<AgentRegistry>, WorkflowExecutor) {
        let mut config = flotilla_config::Config::default();
        config.logging.enabled = false;
        let registry = Arc::new(AgentRegistry::new(client, &config));
        let executor = WorkflowExecutor::new(registry.clone(), Arc::new(MetricsCollector::new()));
        (registry, executor)
    }

    fn plan(subtasks: Vec<Subtask>) -> Task {
        Task::new("task-1", "demo task", "custom", subtasks).unwrap()
    }

    const SUMMARY_OUTPUT: &str = "\
raw preamble that must never travel forward

## Summary
Step one done.

## Files Created
- src/one.rs

## Key Findings
- the codebase uses channels

## Recommendations for Next Agent
Wire the new module in.

trailing raw noise";

    // ── Sequential ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn sequential_threads_distilled_context_only() {
        let client = Arc::new(KeyedClient::new(vec![
            ("analyze the module", ScriptedClient::text_script(SUMMARY_OUTPUT, 0.01)),
            ("build the module", ScriptedClient::text_script("done", 0.02)),
        ]));
        let (_registry, executor) = harness(client.clone());

        let mut task = plan(vec![
            Subtask::new(AgentRole::Analyst, "analyze the module"),
            Subtask::new(AgentRole::Builder, "build the module"),
        ]);
        let results = executor.execute_sequential(&mut task).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));

        let prompts = client.prompts.lock().unwrap().clone();
        // First agent sees only its own description.
        assert_eq!(prompts[0], "analyze the module");
        // Second agent gets the distilled sections...
        assert!(prompts[1].starts_with("build the module"));
        assert!(prompts[1].contains("## Previous Agent Summary"));
        assert!(prompts[1].contains("Step one done."));
        assert!(prompts[1].contains("- src/one.rs"));
        assert!(prompts[1].contains("Wire the new module in."));
        // ...and never the raw output.
        assert!(!prompts[1].contains("raw preamble"));
        assert!(!prompts[1].contains("trailing raw noise"));
    }

    #[tokio::test]
    async fn sequential_failure_clears_forward_context() {
        let client = Arc::new(KeyedClient::new(vec![
            ("first step", ScriptedClient::failing_script("stream broke")),
            ("second step", ScriptedClient::text_script("recovered", 0.0)),
        ]));
        let (_registry, executor) = harness(client.clone());

        let mut task = plan(vec![
            Subtask::new(AgentRole::Analyst, "first step"),
            Subtask::new(AgentRole::Builder, "second step"),
        ]);
        let results = executor.execute_sequential(&mut task).await;

        assert!(!results[0].success);
        assert!(results[1].success);
        // Downstream agent saw only its own description.
        let prompts = client.prompts.lock().unwrap().clone();
        assert_eq!(prompts[1], "second step");
    }

    #[tokio::test]
    async fn sequential_retains_contexts_until_cleanup() {
        let client = Arc::new(KeyedClient::new(vec![(
            "solo step",
            ScriptedClient::text_script(SUMMARY_OUTPUT, 0.0),
        )]));
        let (registry, executor) = harness(client);

        let mut task = plan(vec![Subtask::new(AgentRole::Analyst, "solo step")]);
        let _ = executor.execute_sequential(&mut task).await;

        let agent_id = task.assigned_agents[0].clone();
        let context = executor.context_for(&agent_id).expect("context retained");
        assert_eq!(context.summary, "Step one done.");
        // Agents are retained for observability until cleanup.
        assert!(registry.get(&agent_id).is_some());

        let deleted = executor.cleanup_workflow_agents(&task);
        assert_eq!(deleted, 1);
        assert!(registry.get(&agent_id).is_none());
        assert!(executor.context_for(&agent_id).is_none());
    }

    // ── Parallel ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn parallel_failure_does_not_disturb_siblings() {
        let client = Arc::new(KeyedClient::new(vec![
            ("analyze alpha", ScriptedClient::text_script("alpha fine", 0.01)),
            ("analyze beta", ScriptedClient::failing_script("beta exploded")),
            ("analyze gamma", ScriptedClient::text_script("gamma fine", 0.01)),
        ]));
        let (registry, executor) = harness(client);

        let mut subtasks = vec![
            Subtask::new(AgentRole::Analyst, "analyze alpha"),
            Subtask::new(AgentRole::Analyst, "analyze beta"),
            Subtask::new(AgentRole::Analyst, "analyze gamma"),
        ];
        for s in &mut subtasks {
            s.execution_mode = ExecutionMode::Parallel;
        }
        let mut task = plan(subtasks);
        let results = executor.execute_parallel(&mut task).await;

        // Results in subtask-index order, not completion order.
        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap().contains("beta exploded"));
        assert!(results[2].success);
        assert_eq!(results[0].task_description, "analyze alpha");
        assert_eq!(results[2].task_description, "analyze gamma");

        // All three agents cleaned up.
        assert_eq!(executor.cleanup_workflow_agents(&task), 3);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn parallel_agents_share_no_context() {
        let client = Arc::new(KeyedClient::new(vec![
            ("job one", ScriptedClient::text_script(SUMMARY_OUTPUT, 0.0)),
            ("job two", ScriptedClient::text_script("fine", 0.0)),
        ]));
        let (_registry, executor) = harness(client.clone());

        let mut task = plan(vec![
            Subtask::new(AgentRole::Analyst, "job one"),
            Subtask::new(AgentRole::Analyst, "job two"),
        ]);
        let _ = executor.execute_parallel(&mut task).await;

        let prompts = client.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 2);
        // Both prompts are bare descriptions, whatever the arrival order.
        for prompt in prompts {
            assert!(prompt == "job one" || prompt == "job two", "prompt: {prompt}");
        }
    }

    // ── Dependency DAG ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn dependencies_gate_execution_and_concatenate_contexts() {
        const A_OUT: &str = "## Summary\nA finished.\n";
        const B_OUT: &str = "## Summary\nB finished.\n";
        let client = Arc::new(KeyedClient::new(vec![
            ("produce part a", ScriptedClient::text_script(A_OUT, 0.0)),
            ("produce part b", ScriptedClient::text_script(B_OUT, 0.0)),
            ("combine the parts", ScriptedClient::text_script("combined", 0.0)),
        ]));
        let (registry, executor) = harness(client.clone());

        let mut merge = Subtask::new(AgentRole::Builder, "combine the parts");
        merge.depends_on = vec![0, 1];
        let mut task = plan(vec![
            Subtask::new(AgentRole::Analyst, "produce part a"),
            Subtask::new(AgentRole::Analyst, "produce part b"),
            merge,
        ]);

        let results = executor
            .execute_with_dependencies(&mut task, &HashMap::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));
        // Index order, not completion order.
        assert_eq!(results[2].task_description, "combine the parts");

        let prompts = client.prompts.lock().unwrap().clone();
        let merge_prompt = prompts.iter().find(|p| p.contains("combine")).unwrap();
        assert!(merge_prompt.contains("Context from previous tasks:"));
        // Prerequisite contexts appear in prerequisite-index order.
        let a_pos = merge_prompt.find("A finished.").unwrap();
        let b_pos = merge_prompt.find("B finished.").unwrap();
        assert!(a_pos < b_pos);

        assert_eq!(task.assigned_agents.len(), 3);
        assert_eq!(executor.cleanup_workflow_agents(&task), 3);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn extra_dependency_map_is_honoured() {
        let client = Arc::new(KeyedClient::new(vec![
            ("produce part a", ScriptedClient::text_script("## Summary\nA done.\n", 0.0)),
            ("finish up", ScriptedClient::text_script("ok", 0.0)),
        ]));
        let (_registry, executor) = harness(client.clone());

        let mut task = plan(vec![
            Subtask::new(AgentRole::Analyst, "produce part a"),
            Subtask::new(AgentRole::Builder, "finish up"),
        ]);
        let mut deps = HashMap::new();
        deps.insert(1, vec![0]);

        let results = executor.execute_with_dependencies(&mut task, &deps).await.unwrap();
        assert!(results.iter().all(|r| r.success));

        let prompts = client.prompts.lock().unwrap().clone();
        let second = prompts.iter().find(|p| p.contains("finish up")).unwrap();
        assert!(second.contains("A done."));
    }

    #[tokio::test]
    async fn cyclic_extra_dependencies_are_rejected_before_spawning() {
        let (registry, executor) = harness(Arc::new(ScriptedClient::always_text("x")));
        let mut task = plan(vec![
            Subtask::new(AgentRole::Analyst, "a"),
            Subtask::new(AgentRole::Builder, "b"),
        ]);
        let mut deps = HashMap::new();
        deps.insert(0, vec![1]); // forward edge

        let err = executor
            .execute_with_dependencies(&mut task, &deps)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::ForwardDependency { index: 0, dep: 1 }));
        // Nothing was spawned.
        assert!(registry.is_empty());
    }
}
