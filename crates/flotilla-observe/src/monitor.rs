// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use flotilla_core::{AgentRegistry, AgentStatus};

use crate::metrics::MetricsCollector;

/// Context-usage fraction above which the monitor warns.
const CONTEXT_WARN_PERCENT: f64 = 80.0;

/// Periodic fleet monitor.
///
/// Ticks at a fixed interval, snapshotting every live agent's metrics into
/// the collector and warning when an agent approaches its context window.
/// `stop` flips the shutdown flag and joins the loop; the loop observes the
/// flag within at most one tick.
pub struct FleetMonitor {
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
}

impl FleetMonitor {
    /// Spawn the monitor loop.
    pub fn start(
        registry: Arc<AgentRegistry>,
        metrics: Arc<MetricsCollector>,
        interval: Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        tick(&registry, &metrics);
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("fleet monitor shutting down");
                            break;
                        }
                    }
                }
            }
        });
        Self {
            shutdown,
            handle: Mutex::new(Some(handle)),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "monitor task join failed");
            }
        }
    }
}

fn tick(registry: &AgentRegistry, metrics: &MetricsCollector) {
    for session in registry.list(None, None) {
        if session.status() == AgentStatus::Deleted {
            continue;
        }
        metrics.record_agent_metrics(session.agent_id(), session.metrics());

        let usage = session.context_window_usage();
        if usage.usage_percentage > CONTEXT_WARN_PERCENT {
            warn!(
                agent_id = %session.agent_id(),
                name = %session.config().name,
                usage_percentage = usage.usage_percentage,
                "high context usage"
            );
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
