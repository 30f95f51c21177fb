// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, ModeArg, ReportFormat};
use flotilla_core::ExecutionMode;
use flotilla_runtime::{Orchestrator, PlannerMode};
use flotilla_sdk::CliClient;
use flotilla_store::{AgentRecord, Database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = flotilla_config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Execute { prompt, task_type, mode, plan_with_agent } => {
            let orchestrator =
                Orchestrator::new(config, Arc::new(CliClient::new()))?;
            orchestrator.start();

            let execution_mode = match mode {
                ModeArg::Sequential => ExecutionMode::Sequential,
                ModeArg::Parallel => ExecutionMode::Parallel,
            };
            let planner_mode = if plan_with_agent {
                PlannerMode::Delegated
            } else {
                PlannerMode::Template
            };

            let result = orchestrator
                .execute(&prompt, &task_type, execution_mode, planner_mode)
                .await;
            orchestrator.stop().await;
            let result = result?;

            println!("{}", result.output);
            println!();
            println!(
                "{}: cost ${:.4}, {} tokens, {} tool calls, {} artifacts",
                if result.success { "SUCCESS" } else { "FAILED" },
                result.metrics.total_cost_usd,
                result.metrics.total_tokens,
                result.metrics.tool_calls,
                result.artifacts.len(),
            );
            if let Some(error) = &result.error {
                eprintln!("error: {error}");
            }
            if !result.success {
                std::process::exit(1);
            }
        }

        Commands::Status => {
            let orchestrator = Orchestrator::new(config, Arc::new(CliClient::new()))?;
            let status = orchestrator.get_status();
            println!("{}", serde_json::to_string_pretty(&status)?);
            orchestrator.stop().await;
        }

        Commands::ListAgents { role } => {
            let db = open_store(&config)?;
            let records = db.list_agents(None, role.as_deref())?;
            if records.is_empty() {
                println!("no agents recorded");
            } else {
                println!(
                    "{:<36}  {:<12}  {:<10}  {:<10}  {:>10}  {:>8}",
                    "AGENT", "ROLE", "STATUS", "MESSAGES", "TOKENS", "COST"
                );
                for r in records {
                    println!(
                        "{:<36}  {:<12}  {:<10}  {:<10}  {:>10}  {:>8.4}",
                        r.agent_id, r.role, r.status, r.messages_sent, r.total_tokens, r.total_cost
                    );
                }
            }
        }

        Commands::ListTasks => {
            let db = open_store(&config)?;
            let records = db.list_tasks()?;
            if records.is_empty() {
                println!("no tasks recorded");
            } else {
                for r in records {
                    println!(
                        "{}  [{}] {} — {}",
                        r.task_id, r.status, r.task_type, r.description
                    );
                }
            }
        }

        Commands::AgentDetails { agent_id } => {
            let db = open_store(&config)?;
            match db.get_agent(&agent_id)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => {
                    eprintln!("agent {agent_id} not found");
                    std::process::exit(1);
                }
            }
        }

        Commands::TaskDetails { task_id } => {
            let db = open_store(&config)?;
            match db.get_task(&task_id)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => {
                    eprintln!("task {task_id} not found");
                    std::process::exit(1);
                }
            }
        }

        Commands::Clean { older_than, dry_run } => {
            let db = open_store(&config)?;
            if dry_run {
                let (agents, tasks) = db.count_older_than(older_than)?;
                println!(
                    "would delete {agents} agent record(s) and {tasks} task record(s) older than {older_than} day(s)"
                );
            } else {
                let (agents, tasks) = db.prune_older_than(older_than)?;
                println!(
                    "deleted {agents} agent record(s) and {tasks} task record(s) older than {older_than} day(s)"
                );
            }
        }

        Commands::CostReport { by_agent, by_role, format } => {
            let db = open_store(&config)?;
            let records = db.list_agents(None, None)?;
            print_cost_report(&records, by_agent, by_role, format)?;
        }

        Commands::Init => {
            let config_dir = std::path::Path::new(".flotilla");
            std::fs::create_dir_all(config_dir)?;
            let config_path = config_dir.join("config.yaml");
            if config_path.exists() {
                println!("{} already exists, leaving it alone", config_path.display());
            } else {
                let starter = flotilla_config::Config::default();
                std::fs::write(&config_path, serde_yaml::to_string(&starter)?)?;
                println!("wrote {}", config_path.display());
            }
            std::fs::create_dir_all(&config.logging.agent_log_dir)?;
            println!("log directory: {}", config.logging.agent_log_dir.display());
        }
    }

    Ok(())
}

/// The read commands work against the persisted store; without one there is
/// nothing durable to show.
fn open_store(config: &flotilla_config::Config) -> anyhow::Result<Database> {
    let path = config
        .store
        .db_path
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from(".flotilla/flotilla.db"));
    Database::open(&path)
}

fn print_cost_report(
    records: &[AgentRecord],
    by_agent: bool,
    by_role: bool,
    format: ReportFormat,
) -> anyhow::Result<()> {
    let total_cost: f64 = records.iter().map(|r| r.total_cost).sum();
    let total_tokens: u64 = records.iter().map(|r| r.total_tokens).sum();

    let mut role_costs: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    for r in records {
        let entry = role_costs.entry(r.role.clone()).or_insert((0.0, 0));
        entry.0 += r.total_cost;
        entry.1 += r.total_tokens;
    }

    match format {
        ReportFormat::Json => {
            let mut report = serde_json::json!({
                "total_cost_usd": total_cost,
                "total_tokens": total_tokens,
                "agents": records.len(),
            });
            if by_role {
                report["by_role"] = serde_json::json!(role_costs
                    .iter()
                    .map(|(role, (cost, tokens))| {
                        (role.clone(), serde_json::json!({"cost_usd": cost, "tokens": tokens}))
                    })
                    .collect::<serde_json::Map<_, _>>());
            }
            if by_agent {
                report["by_agent"] = serde_json::json!(records
                    .iter()
                    .map(|r| serde_json::json!({
                        "agent_id": r.agent_id,
                        "role": r.role,
                        "cost_usd": r.total_cost,
                        "tokens": r.total_tokens,
                    }))
                    .collect::<Vec<_>>());
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ReportFormat::Csv => {
            if by_agent {
                println!("agent_id,role,cost_usd,tokens");
                for r in records {
                    println!("{},{},{},{}", r.agent_id, r.role, r.total_cost, r.total_tokens);
                }
            } else if by_role {
                println!("role,cost_usd,tokens");
                for (role, (cost, tokens)) in &role_costs {
                    println!("{role},{cost},{tokens}");
                }
            } else {
                println!("total_cost_usd,total_tokens,agents");
                println!("{total_cost},{total_tokens},{}", records.len());
            }
        }
        ReportFormat::Table => {
            println!(
                "total: ${total_cost:.4} across {} agent(s), {total_tokens} tokens",
                records.len()
            );
            if by_role {
                println!();
                println!("{:<14}  {:>10}  {:>12}", "ROLE", "COST", "TOKENS");
                for (role, (cost, tokens)) in &role_costs {
                    println!("{role:<14}  {cost:>10.4}  {tokens:>12}");
                }
            }
            if by_agent {
                println!();
                println!("{:<36}  {:<12}  {:>10}  {:>12}", "AGENT", "ROLE", "COST", "TOKENS");
                for r in records {
                    println!(
                        "{:<36}  {:<12}  {:>10.4}  {:>12}",
                        r.agent_id, r.role, r.total_cost, r.total_tokens
                    );
                }
            }
        }
    }
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
