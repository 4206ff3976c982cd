use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "skill-canon")]
#[command(about = "Canonicalise skill names and reconcile duplicate skills with a generative model")]
pub struct CliConfig {
    #[arg(long, short, default_value = "configs/skill-canon.toml")]
    pub config: PathBuf,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Validate and canonicalise a JSON array of raw skill strings
    Validate {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "skills_validation.csv")]
        output: String,
    },

    /// Run the merge batch over a skill inventory CSV
    Merge {
        #[arg(long)]
        inventory: PathBuf,

        #[arg(long, help = "Only run the first N jobs")]
        max_jobs: Option<usize>,
    },

    /// Re-export stored validation interactions as CSV
    Export {
        #[arg(long, help = "Only use the N most recent interactions")]
        latest: Option<usize>,

        #[arg(long, default_value = "skills_validation_export.csv")]
        output: String,
    },

    /// Print validation statistics over stored interactions
    Stats {
        #[arg(long, help = "Only use the N most recent interactions")]
        latest: Option<usize>,
    },
}
