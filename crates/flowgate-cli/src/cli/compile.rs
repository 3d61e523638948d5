//! `flowgate compile`: validate a definition and report its hash and step order.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use flowgate_core::workflow::compiler::compile;
use flowgate_core::workflow::definition::load_definition_file;
use flowgate_types::workflow::{CompileIssue, CompileResult, NormalizedWorkflowDefinition};

/// Load and compile a definition file.
pub fn compile_file(path: &Path) -> Result<CompileResult> {
    let raw = load_definition_file(path)
        .with_context(|| format!("Failed to load workflow from {}", path.display()))?;
    Ok(compile(&raw))
}

/// Load and compile, failing with every validation error listed.
pub fn load_workflow(path: &Path) -> Result<NormalizedWorkflowDefinition> {
    let result = compile_file(path)?;
    match result.workflow {
        Some(workflow) if result.ok => Ok(workflow),
        _ => {
            let issues: Vec<String> = result.errors.iter().map(describe_issue).collect();
            bail!(
                "Workflow {} failed to compile:\n  - {}",
                path.display(),
                issues.join("\n  - ")
            )
        }
    }
}

fn describe_issue(issue: &CompileIssue) -> String {
    match &issue.path {
        Some(path) => format!("{} (at {path})", issue.message),
        None => issue.message.clone(),
    }
}

/// Handle `flowgate compile`. Returns whether the definition compiled.
pub fn handle_compile(path: &Path, json: bool, quiet: bool) -> Result<bool> {
    let result = compile_file(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(result.ok);
    }

    if !result.ok {
        eprintln!();
        eprintln!(
            "  {} {} has {} error(s)",
            style("x").red().bold(),
            style(path.display()).cyan(),
            result.errors.len()
        );
        eprintln!();

        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![Cell::new("Path").fg(Color::Cyan), Cell::new("Error")]);
        for issue in &result.errors {
            table.add_row(vec![
                Cell::new(issue.path.as_deref().unwrap_or("-")),
                Cell::new(&issue.message),
            ]);
        }
        eprintln!("{table}");
        eprintln!();
        return Ok(false);
    }

    if quiet {
        return Ok(true);
    }

    println!();
    println!(
        "  {} {} compiled",
        style("*").green().bold(),
        style(path.display()).cyan()
    );
    println!(
        "  Hash:  {}",
        style(result.workflow_hash.as_deref().unwrap_or("-")).dim()
    );
    let order = result.step_order.join(" -> ");
    println!("  Order: {order}");
    println!();
    Ok(true)
}
