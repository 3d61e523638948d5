//! `flowgate run` and `flowgate resume`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Map, Value};

use flowgate_core::event::sink::EventSink;
use flowgate_core::workflow::executor::{WorkflowEngine, WorkflowExecutor};
use flowgate_infra::bash::ProcessBashExecutor;
use flowgate_types::config::EngineConfig;
use flowgate_types::event::WorkflowEvent;
use flowgate_types::workflow::{
    ApprovalDecision, RunPayload, RunPolicy, RunStatus, RuntimeOptions, StepStatus,
    WorkflowRunEnvelope,
};

use super::RunOptions;
use super::compile::load_workflow;

/// Build the engine payload from command-line options.
pub fn build_payload(options: &RunOptions) -> Result<RunPayload> {
    let variables = match options.vars.as_deref() {
        None => Map::new(),
        Some(raw) => match serde_json::from_str::<Value>(raw).context("--vars is not valid JSON")? {
            Value::Object(map) => map,
            other => bail!("--vars must be a JSON object, got {other}"),
        },
    };
    Ok(RunPayload {
        variables,
        runtime: RuntimeOptions {
            attempt: options.attempt,
            policy: RunPolicy {
                max_steps: options.max_steps,
            },
        },
    })
}

fn build_engine(config: &EngineConfig, events: bool) -> WorkflowEngine {
    let engine =
        WorkflowEngine::new(Arc::new(ProcessBashExecutor::new())).with_config(config.clone());
    if !events {
        return engine;
    }
    let sink: Arc<dyn EventSink> = Arc::new(|event: &WorkflowEvent| {
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{line}");
        }
    });
    engine.with_sink(sink)
}

/// Handle `flowgate run`. Returns the final run status.
pub async fn handle_run(
    path: &Path,
    execution_id: &str,
    options: &RunOptions,
    config: &EngineConfig,
    json: bool,
    quiet: bool,
) -> Result<RunStatus> {
    let workflow = load_workflow(path)?;
    let payload = build_payload(options)?;
    let engine = build_engine(config, options.events);

    let envelope = engine.run(execution_id, &workflow, &payload).await;
    print_envelope(&envelope, path, json, quiet)?;
    Ok(envelope.status)
}

/// Handle `flowgate resume`. Returns the final run status.
#[allow(clippy::too_many_arguments)]
pub async fn handle_resume(
    path: &Path,
    execution_id: &str,
    token: &str,
    decision: ApprovalDecision,
    options: &RunOptions,
    config: &EngineConfig,
    json: bool,
    quiet: bool,
) -> Result<RunStatus> {
    let workflow = load_workflow(path)?;
    let payload = build_payload(options)?;
    let engine = build_engine(config, options.events);

    let envelope = engine
        .resume(execution_id, &workflow, &payload, token, decision)
        .await;
    print_envelope(&envelope, path, json, quiet)?;
    Ok(envelope.status)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_envelope(
    envelope: &WorkflowRunEnvelope,
    path: &Path,
    json: bool,
    quiet: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(envelope)?);
        return Ok(());
    }
    if quiet && envelope.status != RunStatus::NeedsApproval {
        return Ok(());
    }

    let marker = match envelope.status {
        RunStatus::Ok => style("*").green().bold(),
        RunStatus::NeedsApproval => style("?").yellow().bold(),
        RunStatus::Cancelled => style("-").dim().bold(),
        RunStatus::Failed => style("x").red().bold(),
    };

    println!();
    println!(
        "  {marker} Run {} of {}: {}",
        style(&envelope.execution_id).cyan(),
        path.display(),
        status_label(envelope.status)
    );
    println!();

    if !envelope.steps.is_empty() {
        println!("{}", steps_table(envelope));
        println!();
    }

    if let Some(err) = &envelope.error {
        println!("  Error: {}", style(err).red());
        println!();
    }

    if let Some(request) = &envelope.requires_approval {
        println!("  Approval required at '{}': {}", style(&request.step_id).cyan(), request.prompt);
        for item in &request.items {
            println!("    - {item}");
        }
        println!();
        println!(
            "  Resume with: {}",
            style(format!(
                "flowgate resume {} --execution-id {} --token {} --decision approve",
                path.display(),
                envelope.execution_id,
                request.resume_token
            ))
            .dim()
        );
        println!();
    }

    if !envelope.output.is_empty() {
        println!("  Outputs:");
        println!("{}", serde_json::to_string_pretty(&envelope.output)?);
        println!();
    }

    Ok(())
}

fn steps_table(envelope: &WorkflowRunEnvelope) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Attempt"),
            Cell::new("Started"),
            Cell::new("Error"),
        ]);

    for s in &envelope.steps {
        let status = match s.status {
            StepStatus::Completed => Cell::new("completed").fg(Color::Green),
            StepStatus::Failed => Cell::new("failed").fg(Color::Red),
            StepStatus::Cancelled => Cell::new("cancelled").fg(Color::DarkGrey),
            StepStatus::WaitingApproval => Cell::new("waiting_approval").fg(Color::Yellow),
            StepStatus::Running => Cell::new("running"),
        };
        let error = s
            .error
            .as_ref()
            .map(|e| e.chars().take(60).collect::<String>())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(&s.step_id),
            status,
            Cell::new(s.attempt),
            Cell::new(s.started_at.format("%H:%M:%S").to_string()),
            Cell::new(error),
        ]);
    }
    table
}

fn status_label(status: RunStatus) -> String {
    match status {
        RunStatus::Ok => style("ok").green().to_string(),
        RunStatus::NeedsApproval => style("needs approval").yellow().to_string(),
        RunStatus::Cancelled => style("cancelled").dim().to_string(),
        RunStatus::Failed => style("failed").red().to_string(),
    }
}
