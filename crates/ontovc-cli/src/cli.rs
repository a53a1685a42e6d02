use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ontovc",
    about = "ontovc: branching and merging for schema documents",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Service configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check branch names against naming and protection rules
    ValidateName(ValidateNameArgs),
    /// Show or check configuration
    Config(ConfigArgs),
    /// Run a branch, propose and merge walkthrough on an in-memory store
    Demo(DemoArgs),
}

#[derive(Args)]
pub struct ValidateNameArgs {
    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Validate the configuration file
    Check,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Merge strategy: merge, squash or rebase
    #[arg(short, long, default_value = "merge")]
    pub strategy: String,

    /// Also change `main` so that the merge conflicts
    #[arg(long)]
    pub conflict: bool,

    /// Resolution policy for conflicts: manual, prefer_source, prefer_target or field_union
    #[arg(long)]
    pub resolve: Option<String>,
}
