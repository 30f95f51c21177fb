// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Persistence adapter: SQLite records for agents and tasks.
//!
//! Persistence exists for observability (dashboards, cost reports), not for
//! workflow resumption.  Writes are idempotent upserts keyed by agent/task
//! id; callers log-and-swallow failures so producers are never blocked.

mod database;
mod models;

pub use database::Database;
pub use models::{AgentRecord, TaskRecord};
