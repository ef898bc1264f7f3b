use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "agentctl", about = "Drive the planner from the command line")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for subcommands that render a plan or report.
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create, run, and inspect plans.
    Plan {
        #[command(subcommand)]
        cmd: PlanCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum PlanCommands {
    /// Derive a plan from a natural-language description and register it.
    Create {
        description: String,
    },
    /// Execute a plan (sequentially or in parallel, per its dependency shape).
    Run {
        plan_id: String,
    },
    Pause {
        plan_id: String,
    },
    Resume {
        plan_id: String,
    },
    Cancel {
        plan_id: String,
    },
    /// Roll a plan's files and git state back to a prior checkpoint.
    Rollback {
        plan_id: String,
        checkpoint_id: String,
    },
    /// Print a plan's current state.
    Show {
        plan_id: String,
    },
    /// Print each step's execution log line.
    Logs {
        plan_id: String,
    },
    /// Show what each pending step would do without running it.
    Preview {
        plan_id: String,
    },
}
