// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Fleet observability: metric aggregation, progress fan-out, and the
//! periodic monitor loop.

mod metrics;
mod monitor;
mod progress;

pub use metrics::{FilesReport, MetricsCollector};
pub use monitor::FleetMonitor;
pub use progress::ProgressBus;
