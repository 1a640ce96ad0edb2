//! Workflow commands: validate and run workflow definition files.

use crate::runtime::Runtime;
use clap::Subcommand;
use colored::Colorize;
use relay_orchestrator::Workflow;
use relay_orchestrator::workflow::execution_order;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Workflow subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum WorkflowCommand {
    /// Check a workflow file and print its execution order
    Validate {
        /// Path to the workflow JSON file
        file: PathBuf,
    },
    /// Execute a workflow file
    Run {
        /// Path to the workflow JSON file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Execute workflow command.
pub async fn execute(command: WorkflowCommand, runtime: &Runtime) -> anyhow::Result<()> {
    match command {
        WorkflowCommand::Validate { file } => validate(&file),
        WorkflowCommand::Run { file, json } => run(&file, json, runtime).await,
    }
}

fn load(file: &Path) -> anyhow::Result<Workflow> {
    Workflow::load(file).map_err(|e| anyhow::anyhow!("{}: {}", file.display(), e))
}

fn validate(file: &Path) -> anyhow::Result<()> {
    let workflow = load(file)?;
    let order = execution_order(&workflow)?;

    println!(
        "{}",
        format!("✓ Workflow '{}' is valid ({} nodes)", workflow.name, workflow.nodes.len()).green()
    );
    println!("  Execution order: {}", order.join(" -> "));
    Ok(())
}

async fn run(file: &Path, json_output: bool, runtime: &Runtime) -> anyhow::Result<()> {
    let workflow = load(file)?;
    let run = runtime.engine().execute(&workflow).await;

    // Sorted for stable output.
    let outputs: BTreeMap<&String, BTreeMap<&String, &Value>> = run
        .outputs
        .iter()
        .map(|(node, ports)| (node, ports.iter().collect()))
        .collect();

    if json_output {
        let mut body = Map::new();
        body.insert("workflow".to_string(), json!(workflow.id));
        body.insert("success".to_string(), json!(run.success));
        body.insert("duration_ms".to_string(), json!(run.duration.as_millis() as u64));
        body.insert("outputs".to_string(), json!(outputs));
        if let Some(ref error) = run.error {
            body.insert("error".to_string(), json!(error.to_string()));
        }
        println!("{}", serde_json::to_string_pretty(&Value::Object(body))?);
    } else if run.success {
        println!();
        println!("{}", format!("⚡ Workflow '{}'", workflow.name).bold().cyan());
        println!();
        for (node, ports) in &outputs {
            println!("  {}", node.bold());
            for (port, value) in ports {
                println!("    {}: {}", port, display_value(value));
            }
        }
        println!();
        println!(
            "{}",
            format!("✓ Completed {} nodes in {}ms", outputs.len(), run.duration.as_millis()).green()
        );
    }

    match run.error {
        Some(error) => Err(anyhow::anyhow!("Workflow '{}' failed: {}", workflow.name, error)),
        None => Ok(()),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
