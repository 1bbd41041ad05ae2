//! # ctask - Care task CLI
//!
//! Command-line front end for the care task engine. Every command opens the JSON database,
//! runs one engine operation and prints the result.
//!
//! ## Quick Start
//!
//! ```bash
//! # Load the task library, templates and observation tools
//! ctask catalog import catalog.json
//!
//! # Give an owner a medication task
//! ctask create custom --audience parent-task --category medication --name "Evening dose" \
//!     --by vet-1 --to owner-1 --companion rex --due tomorrow \
//!     --medication '{"name":"Meloxicam","doses":[{"time":"18:00","dosage":"0.5ml"}]}'
//!
//! # Submit an observation and complete the bound task
//! ctask submit --tool pain-score --task <id> --companion rex --filled-by owner-1 \
//!     --answers '{"q1":"yes"}'
//!
//! # List what is still open
//! ctask list mine --actor owner-1 --status pending
//! ```
//!
//! Data is stored in `~/.care_tasks/care_tasks.json` unless `--db` or `CARE_TASKS_HOME`
//! says otherwise.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use care_tasks::cli::Cli;
use care_tasks::cmd::{cmd_completions, run_command, Commands};
use care_tasks::config::{self, Config};
use care_tasks::db::Database;
use care_tasks::engine::TaskEngine;
use care_tasks::notify::{LogNotifier, NoopNotifier, Notifier};

fn main() {
    let cli = Cli::parse();

    // Completions never touch the database
    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return;
    }

    let config = Config::resolve(cli.db, cli.log, !cli.no_notify);

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();
    tracing::debug!(version = config::APP_VERSION, db = %config.db_path.display(), "Starting ctask");

    if let Err(e) = config.ensure_data_dir() {
        eprintln!(
            "Failed to create data directory {}: {}",
            config.data_dir.display(),
            e
        );
        std::process::exit(1);
    }

    let db = match Database::open(&config.db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to open database {}: {}", config.db_path.display(), e);
            std::process::exit(1);
        }
    };

    let notifier: Arc<dyn Notifier> = if config.notify {
        Arc::new(LogNotifier)
    } else {
        Arc::new(NoopNotifier)
    };
    let mut engine = TaskEngine::new(db, notifier);

    if let Err(e) = run_command(&mut engine, cli.command) {
        eprintln!("error[{}]: {}", e.status(), e);
        std::process::exit(1);
    }
}
