//! flowgate CLI entry point.
//!
//! Binary name: `flowgate`
//!
//! Parses CLI arguments, loads `flowgate.toml`, installs tracing, then
//! dispatches to the command handler.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use flowgate_infra::config::{resolve_config_dir, try_load_engine_config};
use flowgate_observe::tracing_setup::{
    LogFormat, init_tracing, shutdown_tracing, verbosity_directive,
};
use flowgate_types::workflow::RunStatus;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Shell completions don't need config or tracing
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "flowgate", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config_dir = cli.config_dir.clone().unwrap_or_else(resolve_config_dir);
    // Config decides whether OTel is on, so it is read before tracing starts;
    // any error is held back and logged once the subscriber is installed.
    let loaded = try_load_engine_config(&config_dir).await;
    let config = loaded.as_ref().cloned().unwrap_or_default();

    let format = if cli.json { LogFormat::Json } else { LogFormat::Pretty };
    init_tracing(
        verbosity_directive(cli.verbose, cli.quiet),
        format,
        cli.otel || config.otel,
    )
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
    if let Err(err) = &loaded {
        tracing::warn!("{err}, using defaults");
    }
    tracing::debug!(config_dir = %config_dir.display(), ?config, "Loaded engine config");

    let code = match cli.command {
        Commands::Compile { file } => {
            if cli::compile::handle_compile(&file, cli.json, cli.quiet)? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }

        Commands::Run {
            file,
            execution_id,
            options,
        } => {
            let execution_id = execution_id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
            let status = cli::run::handle_run(
                &file,
                &execution_id,
                &options,
                &config,
                cli.json,
                cli.quiet,
            )
            .await?;
            exit_code_for(status)
        }

        Commands::Resume {
            file,
            execution_id,
            token,
            decision,
            options,
        } => {
            let status = cli::run::handle_resume(
                &file,
                &execution_id,
                &token,
                decision,
                &options,
                &config,
                cli.json,
                cli.quiet,
            )
            .await?;
            exit_code_for(status)
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    };

    shutdown_tracing();
    Ok(code)
}

/// Only failed runs exit non-zero; suspension and denial are normal outcomes.
fn exit_code_for(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Failed => ExitCode::FAILURE,
        RunStatus::Ok | RunStatus::NeedsApproval | RunStatus::Cancelled => ExitCode::SUCCESS,
    }
}
