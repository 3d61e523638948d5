//! CLI command definitions for the `flowgate` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod compile;
pub mod run;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use flowgate_types::workflow::ApprovalDecision;

/// Compile and run approval-gated workflows.
#[derive(Parser)]
#[command(name = "flowgate", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Directory holding `flowgate.toml`.
    #[arg(long, global = true, env = "FLOWGATE_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a workflow file and print its hash and step order.
    Compile {
        /// Path to a `.json`, `.yaml` or `.yml` workflow definition.
        file: PathBuf,
    },

    /// Compile and run a workflow from the beginning.
    Run {
        /// Path to a `.json`, `.yaml` or `.yml` workflow definition.
        file: PathBuf,

        /// Execution id (a UUIDv7 is generated when omitted).
        #[arg(long)]
        execution_id: Option<String>,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Resume a suspended run at an approval checkpoint.
    Resume {
        /// Path to the same workflow definition the run was started with.
        file: PathBuf,

        /// Execution id of the suspended run.
        #[arg(long)]
        execution_id: String,

        /// Resume token printed when the run suspended.
        #[arg(long)]
        token: String,

        /// Decision to apply at the checkpoint.
        #[arg(long, value_parser = parse_decision)]
        decision: ApprovalDecision,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Options shared by `run` and `resume`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunOptions {
    /// Run variables as a JSON object, e.g. '{"deploy": true}'.
    #[arg(long)]
    pub vars: Option<String>,

    /// Attempt number (must match between run and resume).
    #[arg(long)]
    pub attempt: Option<i64>,

    /// Step budget for this run (overrides the configured one).
    #[arg(long)]
    pub max_steps: Option<i64>,

    /// Stream every engine event as a JSON line on stderr.
    #[arg(long)]
    pub events: bool,
}

fn parse_decision(raw: &str) -> Result<ApprovalDecision, String> {
    raw.parse()
}
