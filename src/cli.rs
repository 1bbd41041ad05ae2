use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// File-backed care task engine CLI.
/// Storage defaults to ~/.care_tasks/care_tasks.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "ctask", version, about = "Care task and observation management CLI")]
pub struct Cli {
    /// Path to the JSON database file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Log filter, e.g. "care_tasks=debug". RUST_LOG takes precedence.
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Do not send assignment notifications.
    #[arg(long, global = true)]
    pub no_notify: bool,

    #[command(subcommand)]
    pub command: Commands,
}
