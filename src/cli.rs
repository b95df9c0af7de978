//! CLI argument parsing for debtledger

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "debtledger")]
#[command(version)]
#[command(about = "Per-version technical debt histories from SonarQube analyses", long_about = None)]
pub struct Cli {
    /// Workspace holding `.debtledger/settings.json` and the export file
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub workspace: PathBuf,

    /// Also print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write the default settings file if missing and show the effective settings
    Init,
    /// New, existing and fixed debt of every analysis of every project
    DebtHistory,
    /// Component, tag and rule debt per version (needs the single-version server)
    Characterize,
    /// Package debt per configured application version
    PackageHistory,
    /// List the exports stored in the workspace
    Runs,
}
