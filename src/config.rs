//! Runtime configuration: where the database lives and how loudly to log.

use std::env;
use std::path::{Path, PathBuf};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Data directory override.
pub const HOME_ENV: &str = "CARE_TASKS_HOME";
/// Log filter override, used when `RUST_LOG` is not set.
pub const LOG_ENV: &str = "CARE_TASKS_LOG";

const DB_FILE: &str = "care_tasks.json";

pub fn default_log_filter() -> String {
    "care_tasks=info".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_filter: String,
    pub notify: bool,
}

impl Config {
    /// Resolve from CLI flags first, then the environment, then defaults.
    pub fn resolve(db: Option<PathBuf>, log: Option<String>, notify: bool) -> Self {
        Self::resolve_with(db, log, notify, |key| env::var(key).ok())
    }

    fn resolve_with(
        db: Option<PathBuf>,
        log: Option<String>,
        notify: bool,
        var: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let (data_dir, db_path) = match db {
            Some(path) => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."))
                    .to_path_buf();
                (dir, path)
            }
            None => {
                let dir = var(HOME_ENV)
                    .map(PathBuf::from)
                    .or_else(|| var("HOME").map(|h| PathBuf::from(h).join(".care_tasks")))
                    .unwrap_or_else(|| PathBuf::from(".care_tasks"));
                let db_path = dir.join(DB_FILE);
                (dir, db_path)
            }
        };
        let log_filter = log
            .or_else(|| var(LOG_ENV))
            .unwrap_or_else(default_log_filter);
        Config {
            data_dir,
            db_path,
            log_filter,
            notify,
        }
    }

    /// Create the data directory if it does not exist yet.
    pub fn ensure_data_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}
