// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use flotilla_core::AgentEvent;

/// Single-producer, many-consumer event fan-out.
///
/// Subscribers receive events in publication order over unbounded channels,
/// so publishing never back-pressures the producer.  A subscriber whose
/// receiver has gone away is dropped from the set; delivery to the others
/// continues.
#[derive(Default)]
pub struct ProgressBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<AgentEvent>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Publish one event to every live subscriber.  Best-effort: failed
    /// sends drop that subscriber and the rest still receive the event.
    pub fn publish(&self, event: &AgentEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.len() < before {
            debug!(
                dropped = before - subscribers.len(),
                remaining = subscribers.len(),
                "dropped dead progress subscribers"
            );
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
