//! Root CLI structure for mixin-rs

use clap::{Parser, Subcommand};

use crate::commands::{apply, inspect, list, pack, plan};

#[derive(Parser)]
#[command(name = "mixin-rs")]
#[command(about = "Plan and apply binary mixins to game asset modules", long_about = None)]
#[command(version)]
#[command(author)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the mixins of a manifest
    List(list::ListArgs),

    /// Plan a selection and show the per-module order
    Plan(plan::PlanArgs),

    /// Apply a selection to baseline modules
    Apply(apply::ApplyArgs),

    /// Decode a payload file and list its operations
    Inspect(inspect::InspectArgs),

    /// Build a payload file from a YAML or JSON description
    Pack(pack::PackArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
