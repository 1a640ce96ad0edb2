//! Task commands: run a batch of agent tasks through the scheduler.

use crate::runtime::Runtime;
use anyhow::Context;
use clap::Subcommand;
use colored::Colorize;
use relay_abstraction::Response;
use relay_orchestrator::{AgentTask, AgentTaskResult};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

/// Task subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum TasksCommand {
    /// Run a JSON array of agent tasks
    Run {
        /// Path to the task file
        file: PathBuf,
        /// Ignore dependencies and run every task at once
        #[arg(long)]
        parallel: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Execute tasks command.
pub async fn execute(command: TasksCommand, runtime: &Runtime) -> anyhow::Result<()> {
    match command {
        TasksCommand::Run { file, parallel, json } => run(&file, parallel, json, runtime).await,
    }
}

fn load(file: &Path) -> anyhow::Result<Vec<AgentTask>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid task file {}", file.display()))
}

async fn run(file: &Path, parallel: bool, json_output: bool, runtime: &Runtime) -> anyhow::Result<()> {
    let tasks = load(file)?;
    let scheduler = runtime.scheduler();

    let (completed, failed, unresolved, duration) = if parallel {
        let report = scheduler.run_parallel(tasks).await;
        (report.completed, report.failed, Vec::new(), report.duration)
    } else {
        let report = scheduler.run_with_dependencies(tasks).await;
        (report.completed, report.failed, report.unresolved, report.duration)
    };
    let budget = runtime.router().quota().status();

    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "completed": completed.iter().map(completed_json).collect::<Vec<_>>(),
                "failed": failed.iter().map(failed_json).collect::<Vec<_>>(),
                "unresolved": unresolved,
                "duration_ms": duration.as_millis() as u64,
                "budget": budget,
            }))?
        );
    } else {
        println!();
        println!("{}", "🧩 Task Results".bold().cyan());
        println!();
        for result in &completed {
            let text = result.outcome.response().map(response_text).unwrap_or_default();
            println!("  {} {}: {}", "✓".green(), result.id.bold(), text);
        }
        for result in &failed {
            let error = result.outcome.error().map(ToString::to_string).unwrap_or_default();
            println!("  {} {}: {}", "✗".red(), result.id.bold(), error.red());
        }
        for id in &unresolved {
            println!("  {} {}: {}", "?".yellow(), id.bold(), "dependencies never resolved".yellow());
        }
        println!();
        println!(
            "  Completed: {}  Failed: {}  Unresolved: {}  ({}ms, {} tokens, ${:.4})",
            completed.len(),
            failed.len(),
            unresolved.len(),
            duration.as_millis(),
            budget.tokens_used,
            budget.spent
        );
        println!();
    }

    if failed.is_empty() && unresolved.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} task(s) failed, {} unresolved", failed.len(), unresolved.len())
    }
}

fn response_text(response: &Response) -> String {
    let payload = &response.payload;
    payload
        .text
        .clone()
        .or_else(|| payload.code.clone())
        .unwrap_or_else(|| payload.media_urls.join(", "))
}

fn completed_json(result: &AgentTaskResult) -> Value {
    let response = result.outcome.response();
    json!({
        "id": result.id,
        "provider": response.map(|r| r.provider_tag.clone()),
        "model": response.map(|r| r.model_id.clone()),
        "output": response.map(response_text),
        "tokens": response.map(|r| r.tokens_used),
        "cost": response.map(|r| r.cost),
        "duration_ms": result.duration.as_millis() as u64,
    })
}

fn failed_json(result: &AgentTaskResult) -> Value {
    json!({
        "id": result.id,
        "error": result.outcome.error().map(ToString::to_string),
    })
}
