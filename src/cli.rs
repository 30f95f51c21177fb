// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Execution strategy for a task's subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ModeArg {
    /// Run subtasks in order, threading distilled context forward.
    #[default]
    Sequential,
    /// Run all subtasks concurrently, no shared context.
    Parallel,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Parser, Debug)]
#[command(
    name = "flotilla",
    about = "A fleet orchestrator for AI coding agents",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan and execute a high-level task with a fleet of agents.
    Execute {
        /// The task description.
        prompt: String,

        /// Task type (auto, feature_implementation, bug_fix, code_review,
        /// documentation, refactoring, testing, investigation, custom)
        #[arg(long, default_value = "auto")]
        task_type: String,

        /// Execution strategy.
        #[arg(long, value_enum, default_value = "sequential")]
        mode: ModeArg,

        /// Ask a workflow-planner agent to design the plan instead of the
        /// deterministic templates (falls back to templates on bad replies).
        #[arg(long)]
        plan_with_agent: bool,
    },

    /// Show orchestrator status: fleet, metrics, tasks, monitoring.
    Status,

    /// List agents (live fleet first, stored records otherwise).
    ListAgents {
        /// Filter by role (lowercase, e.g. "builder").
        #[arg(long)]
        role: Option<String>,
    },

    /// List known tasks.
    ListTasks,

    /// Show details for one agent.
    AgentDetails { agent_id: String },

    /// Show details for one task.
    TaskDetails { task_id: String },

    /// Remove old agent/task records from the store.
    Clean {
        /// Only remove records older than this many days.
        #[arg(long, default_value = "7")]
        older_than: i64,

        /// Show what would be deleted without deleting.
        #[arg(long)]
        dry_run: bool,
    },

    /// Cost report across stored agents.
    CostReport {
        /// Break the report down by agent.
        #[arg(long)]
        by_agent: bool,

        /// Break the report down by role.
        #[arg(long)]
        by_role: bool,

        /// Output format.
        #[arg(long, value_enum, default_value = "table")]
        format: ReportFormat,
    },

    /// Create a starter config file and the agent log directory.
    Init,
}
