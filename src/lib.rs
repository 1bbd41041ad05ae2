//! # care_tasks - Care task lifecycle and observation engine
//!
//! Coordinates care tasks (medication administration, hygiene checks, observation
//! assessments) for companion animals across clinic staff and animal owners.
//!
//! ## Key Features
//!
//! - **Three provenances**: tasks come from the shared library, an organisation template,
//!   or a custom entry, each with its own creation variant
//! - **Guarded mutation**: only a task's creator or assignee may update it or change its
//!   status, and only the creator may reassign it
//! - **Terminal states**: completed and cancelled tasks never move again
//! - **Observation tools**: structured answer sets are scored and, when bound to a task,
//!   complete it and leave an immutable completion record
//! - **Local File Storage**: a single JSON file, rewritten atomically on every change
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use care_tasks::db::Database;
//! use care_tasks::engine::{CustomTask, TaskDraft, TaskEngine};
//! use care_tasks::fields::Audience;
//! use care_tasks::notify::LogNotifier;
//!
//! let db = Database::open(std::path::Path::new("care_tasks.json")).unwrap();
//! let mut engine = TaskEngine::new(db, Arc::new(LogNotifier));
//! let mut draft = TaskDraft::new("vet-1", "owner-1", chrono::Utc::now());
//! draft.companion_id = Some("rex".into());
//! let task = engine
//!     .create_custom(CustomTask {
//!         audience: Audience::ParentTask,
//!         category: "hygiene".into(),
//!         name: "Brush teeth".into(),
//!         draft,
//!     })
//!     .unwrap();
//! println!("created {}", task.id);
//! ```

pub mod cli;
pub mod cmd;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fields;
pub mod identity;
pub mod notify;
pub mod observation;
pub mod patch;
pub mod resolve;
pub mod sanitize;
pub mod scoring;
pub mod submission;
pub mod task;

pub use error::{ErrorKind, StoreError, TaskError, TaskResult};
