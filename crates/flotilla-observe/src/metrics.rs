// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use flotilla_core::AgentMetrics;

/// One journaled observability event.
#[derive(Debug, Clone, Serialize)]
pub struct MetricEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub data: serde_json::Value,
}

/// Files consumed vs produced across the fleet.
#[derive(Debug, Clone, Serialize)]
pub struct FilesReport {
    pub consumed: Vec<String>,
    pub produced: Vec<String>,
    /// Files written that were never read first.
    pub net_files_created: usize,
}

struct Inner {
    agent_metrics: HashMap<String, AgentMetrics>,
    events: Vec<MetricEvent>,
}

/// Aggregates metrics snapshots across all agents, past and present.
///
/// Snapshots are keyed by agent id and overwritten on each update, so the
/// collector always reflects each agent's latest observed counters even
/// after the agent itself is deleted from the registry.
#[derive(Default)]
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

impl Default for Inner {
    fn default() -> Self {
        Self { agent_metrics: HashMap::new(), events: Vec::new() }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest metrics snapshot for an agent.
    pub fn record_agent_metrics(&self, agent_id: &str, metrics: AgentMetrics) {
        self.inner
            .lock()
            .unwrap()
            .agent_metrics
            .insert(agent_id.to_string(), metrics);
    }

    /// Journal an observability event.
    pub fn record_event(&self, kind: &str, data: serde_json::Value) {
        self.inner.lock().unwrap().events.push(MetricEvent {
            timestamp: Utc::now(),
            kind: kind.to_string(),
            data,
        });
    }

    pub fn agent_metrics(&self, agent_id: &str) -> Option<AgentMetrics> {
        self.inner.lock().unwrap().agent_metrics.get(agent_id).cloned()
    }

    pub fn total_cost(&self) -> f64 {
        self.inner
            .lock()
            .unwrap()
            .agent_metrics
            .values()
            .map(|m| m.total_cost_usd)
            .sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .agent_metrics
            .values()
            .map(|m| m.total_tokens)
            .sum()
    }

    /// Cost breakdown keyed by agent id.
    pub fn cost_by_agent(&self) -> HashMap<String, f64> {
        self.inner
            .lock()
            .unwrap()
            .agent_metrics
            .iter()
            .map(|(id, m)| (id.clone(), m.total_cost_usd))
            .collect()
    }

    /// Files consumed vs produced — the fleet's input/output footprint.
    pub fn files_consumed_and_produced(&self) -> FilesReport {
        let inner = self.inner.lock().unwrap();
        let mut consumed = BTreeSet::new();
        let mut produced = BTreeSet::new();
        for m in inner.agent_metrics.values() {
            consumed.extend(m.files_read.iter().cloned());
            produced.extend(m.files_written.iter().cloned());
        }
        let net_files_created = produced.difference(&consumed).count();
        FilesReport {
            consumed: consumed.into_iter().collect(),
            produced: produced.into_iter().collect(),
            net_files_created,
        }
    }

    /// Summary of everything the collector has seen.
    pub fn summary(&self) -> serde_json::Value {
        let files = self.files_consumed_and_produced();
        let inner = self.inner.lock().unwrap();
        let total_tool_calls: u64 = inner.agent_metrics.values().map(|m| m.tool_calls).sum();
        let total_messages: u64 = inner.agent_metrics.values().map(|m| m.messages_sent).sum();
        let total_cost: f64 = inner.agent_metrics.values().map(|m| m.total_cost_usd).sum();
        let total_tokens: u64 = inner.agent_metrics.values().map(|m| m.total_tokens).sum();
        serde_json::json!({
            "total_agents": inner.agent_metrics.len(),
            "total_cost": format!("${total_cost:.4}"),
            "total_tokens": total_tokens,
            "total_tool_calls": total_tool_calls,
            "total_messages": total_messages,
            "files_consumed": files.consumed.len(),
            "files_produced": files.produced.len(),
            "net_files_created": files.net_files_created,
            "total_events": inner.events.len(),
        })
    }

    /// All journaled events of one kind.
    pub fn events_by_type(&self, kind: &str) -> Vec<MetricEvent> {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Timeline of events concerning one agent.
    pub fn agent_timeline(&self, agent_id: &str) -> Vec<MetricEvent> {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.data.get("agent_id").and_then(|v| v.as_str()) == Some(agent_id))
            .cloned()
            .collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_sdk::Usage;

    fn metrics_with(cost: f64, input: u64) -> AgentMetrics {
        let mut m = AgentMetrics::default();
        m.add_usage(&Usage { input_tokens: input, ..Default::default() });
        m.total_cost_usd = cost;
        m
    }

    #[test]
    fn snapshots_overwrite_per_agent() {
        let c = MetricsCollector::new();
        c.record_agent_metrics("a1", metrics_with(0.1, 10));
        c.record_agent_metrics("a1", metrics_with(0.3, 30));
        assert_eq!(c.total_cost(), 0.3);
        assert_eq!(c.total_tokens(), 30);
    }

    #[test]
    fn totals_sum_across_agents() {
        let c = MetricsCollector::new();
        c.record_agent_metrics("a1", metrics_with(0.1, 10));
        c.record_agent_metrics("a2", metrics_with(0.2, 20));
        assert!((c.total_cost() - 0.3).abs() < 1e-12);
        assert_eq!(c.total_tokens(), 30);
        assert_eq!(c.cost_by_agent().len(), 2);
    }

    #[test]
    fn files_report_sorts_and_nets() {
        let c = MetricsCollector::new();
        let mut a = AgentMetrics::default();
        a.record_file_read("/src/lib.rs");
        a.record_file_written("/src/lib.rs");
        a.record_file_written("/src/new.rs");
        c.record_agent_metrics("a1", a);

        let report = c.files_consumed_and_produced();
        assert_eq!(report.consumed, vec!["/src/lib.rs"]);
        assert_eq!(report.produced, vec!["/src/lib.rs", "/src/new.rs"]);
        // Only /src/new.rs was produced without being consumed.
        assert_eq!(report.net_files_created, 1);
    }

    #[test]
    fn event_journal_filters_by_type_and_agent() {
        let c = MetricsCollector::new();
        c.record_event("agent_created", serde_json::json!({"agent_id": "a1"}));
        c.record_event("agent_created", serde_json::json!({"agent_id": "a2"}));
        c.record_event("error", serde_json::json!({"agent_id": "a1"}));

        assert_eq!(c.events_by_type("agent_created").len(), 2);
        assert_eq!(c.events_by_type("missing").len(), 0);
        let timeline = c.agent_timeline("a1");
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[1].kind, "error");
    }

    #[test]
    fn summary_reports_counts() {
        let c = MetricsCollector::new();
        c.record_agent_metrics("a1", metrics_with(0.5, 100));
        c.record_event("agent_created", serde_json::json!({"agent_id": "a1"}));
        let s = c.summary();
        assert_eq!(s["total_agents"], 1);
        assert_eq!(s["total_tokens"], 100);
        assert_eq!(s["total_events"], 1);
        assert_eq!(s["total_cost"], "$0.5000");
    }
}
