//! Persistence for tasks, catalogs, observation submissions and completion records.
//!
//! The engine talks to storage through the [`Store`] trait. [`Database`] is the bundled
//! implementation: in-memory collections that are flushed to a JSON file after every write
//! when a path is attached.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::fields::{Audience, TaskStatus};
use crate::identity::ParentProfile;
use crate::observation::{ObservationToolDefinition, ObservationToolSubmission};
use crate::task::{Task, TaskCompletion, TaskLibraryDefinition, TaskTemplate};

/// Which slice of the task collection a listing reads.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskScope {
    /// Parent tasks the parent created or is assigned to.
    Parent { parent_id: String },
    /// Employee tasks of an organisation, optionally narrowed to one assignee.
    Employee {
        organisation_id: String,
        user_id: Option<String>,
    },
    /// Tasks about one companion, optionally narrowed to an audience.
    Companion {
        companion_id: String,
        audience: Option<Audience>,
    },
    /// Tasks under an appointment that carry an observation tool.
    AppointmentObservations { appointment_id: String },
}

/// Task listing query. Results come back ascending by due time.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskQuery {
    pub scope: TaskScope,
    /// Accepted statuses; empty means any.
    pub statuses: Vec<TaskStatus>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl TaskQuery {
    pub fn new(scope: TaskScope) -> Self {
        TaskQuery {
            scope,
            statuses: Vec::new(),
            due_from: None,
            due_to: None,
            offset: 0,
            limit: None,
        }
    }

    /// Whether a task falls inside this query, ignoring paging.
    pub fn matches(&self, t: &Task) -> bool {
        let in_scope = match &self.scope {
            TaskScope::Parent { parent_id } => {
                t.audience == Audience::ParentTask
                    && (&t.assigned_to == parent_id || &t.created_by == parent_id)
            }
            TaskScope::Employee {
                organisation_id,
                user_id,
            } => {
                t.audience == Audience::EmployeeTask
                    && t.organisation_id.as_ref() == Some(organisation_id)
                    && user_id.as_ref().map_or(true, |u| &t.assigned_to == u)
            }
            TaskScope::Companion {
                companion_id,
                audience,
            } => {
                t.companion_id.as_ref() == Some(companion_id)
                    && audience.map_or(true, |a| t.audience == a)
            }
            TaskScope::AppointmentObservations { appointment_id } => {
                t.appointment_id.as_ref() == Some(appointment_id)
                    && t.observation_tool_id.is_some()
            }
        };
        in_scope
            && (self.statuses.is_empty() || self.statuses.contains(&t.status))
            && self.due_from.map_or(true, |from| t.due_at >= from)
            && self.due_to.map_or(true, |to| t.due_at <= to)
    }
}

/// Submission listing query. Results come back newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionQuery {
    pub companion_id: Option<String>,
    pub tool_id: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

impl SubmissionQuery {
    pub fn matches(&self, s: &ObservationToolSubmission) -> bool {
        self.companion_id.as_ref().map_or(true, |c| &s.companion_id == c)
            && self.tool_id.as_ref().map_or(true, |t| &s.tool_id == t)
            && self.from_date.map_or(true, |from| s.created_at >= from)
            && self.to_date.map_or(true, |to| s.created_at <= to)
    }
}

/// Storage primitives the engine needs. Saves are last-writer-wins.
pub trait Store {
    fn task(&self, id: &str) -> Result<Option<Task>, StoreError>;
    fn insert_task(&mut self, task: Task) -> Result<(), StoreError>;
    fn save_task(&mut self, task: &Task) -> Result<(), StoreError>;
    fn find_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError>;

    fn library_task(&self, id: &str) -> Result<Option<TaskLibraryDefinition>, StoreError>;
    fn library(&self) -> Result<Vec<TaskLibraryDefinition>, StoreError>;
    fn template(&self, id: &str) -> Result<Option<TaskTemplate>, StoreError>;
    fn templates_for(&self, organisation_id: &str) -> Result<Vec<TaskTemplate>, StoreError>;
    fn tool(&self, id: &str) -> Result<Option<ObservationToolDefinition>, StoreError>;
    fn tools(&self) -> Result<Vec<ObservationToolDefinition>, StoreError>;
    fn tools_by_ids(&self, ids: &[String]) -> Result<Vec<ObservationToolDefinition>, StoreError>;

    fn insert_completion(&mut self, completion: TaskCompletion) -> Result<(), StoreError>;
    fn completion_for_task(&self, task_id: &str) -> Result<Option<TaskCompletion>, StoreError>;

    fn submission(&self, id: &str) -> Result<Option<ObservationToolSubmission>, StoreError>;
    /// Most recent submission bound to a task.
    fn latest_submission_for_task(
        &self,
        task_id: &str,
    ) -> Result<Option<ObservationToolSubmission>, StoreError>;
    fn submissions_for_tasks(
        &self,
        task_ids: &[String],
    ) -> Result<Vec<ObservationToolSubmission>, StoreError>;
    /// Any submission other than `excluding` already linked to the appointment.
    fn submission_for_appointment(
        &self,
        appointment_id: &str,
        excluding: &str,
    ) -> Result<Option<ObservationToolSubmission>, StoreError>;
    /// Fails with [`StoreError::Duplicate`] if the task already has a submission.
    fn insert_submission(&mut self, submission: ObservationToolSubmission) -> Result<(), StoreError>;
    fn save_submission(&mut self, submission: &ObservationToolSubmission) -> Result<(), StoreError>;
    fn find_submissions(
        &self,
        query: &SubmissionQuery,
    ) -> Result<Vec<ObservationToolSubmission>, StoreError>;
}

/// Catalog document accepted by [`Database::import`].
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogImport {
    #[serde(default)]
    pub library: Vec<TaskLibraryDefinition>,
    #[serde(default)]
    pub templates: Vec<TaskTemplate>,
    #[serde(default)]
    pub tools: Vec<ObservationToolDefinition>,
    #[serde(default)]
    pub parents: Vec<ParentProfile>,
}

/// Counts of records written by an import.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub library: usize,
    pub templates: usize,
    pub tools: usize,
    pub parents: usize,
}

/// In-memory database, optionally backed by a JSON file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub library: Vec<TaskLibraryDefinition>,
    #[serde(default)]
    pub templates: Vec<TaskTemplate>,
    #[serde(default)]
    pub tools: Vec<ObservationToolDefinition>,
    #[serde(default)]
    pub submissions: Vec<ObservationToolSubmission>,
    #[serde(default)]
    pub completions: Vec<TaskCompletion>,
    #[serde(default)]
    pub parents: Vec<ParentProfile>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Database {
    /// A database that never touches disk.
    pub fn in_memory() -> Self {
        Database::default()
    }

    /// Load from a JSON file, starting empty if the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut db = if path.exists() {
            serde_json::from_str::<Database>(&fs::read_to_string(path)?)?
        } else {
            Database::default()
        };
        db.path = Some(path.to_path_buf());
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the whole database next to `path` and rename it into place, so readers only
    /// ever see a complete file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let staging = path.with_extension("json.tmp");
        let mut out = BufWriter::new(File::create(&staging)?);
        serde_json::to_writer_pretty(&mut out, self)?;
        out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&staging, path)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => self.save(path),
            None => Ok(()),
        }
    }

    /// Upsert catalog entries and parent profiles by id.
    pub fn import(&mut self, catalog: CatalogImport) -> Result<ImportSummary, StoreError> {
        let summary = ImportSummary {
            library: catalog.library.len(),
            templates: catalog.templates.len(),
            tools: catalog.tools.len(),
            parents: catalog.parents.len(),
        };
        for entry in catalog.library {
            upsert(&mut self.library, entry, |e| e.id.clone());
        }
        for entry in catalog.templates {
            upsert(&mut self.templates, entry, |e| e.id.clone());
        }
        for entry in catalog.tools {
            upsert(&mut self.tools, entry, |e| e.id.clone());
        }
        for entry in catalog.parents {
            upsert(&mut self.parents, entry, |e| e.id.clone());
        }
        self.flush()?;
        Ok(summary)
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> String) {
    let k = key(&item);
    match items.iter().position(|existing| key(existing) == k) {
        Some(idx) => items[idx] = item,
        None => items.push(item),
    }
}

impl Store for Database {
    fn task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.iter().find(|t| t.id == id).cloned())
    }

    fn insert_task(&mut self, task: Task) -> Result<(), StoreError> {
        if self.tasks.iter().any(|t| t.id == task.id) {
            return Err(StoreError::Duplicate {
                collection: "tasks",
                key: task.id,
            });
        }
        self.tasks.push(task);
        self.flush()
    }

    fn save_task(&mut self, task: &Task) -> Result<(), StoreError> {
        upsert(&mut self.tasks, task.clone(), |t| t.id.clone());
        self.flush()
    }

    fn find_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        let mut found: Vec<&Task> = self.tasks.iter().filter(|t| query.matches(t)).collect();
        found.sort_by_key(|t| t.due_at);
        let page = found.into_iter().skip(query.offset);
        let tasks = match query.limit {
            Some(n) => page.take(n).cloned().collect(),
            None => page.cloned().collect(),
        };
        Ok(tasks)
    }

    fn library_task(&self, id: &str) -> Result<Option<TaskLibraryDefinition>, StoreError> {
        Ok(self.library.iter().find(|l| l.id == id).cloned())
    }

    fn library(&self) -> Result<Vec<TaskLibraryDefinition>, StoreError> {
        Ok(self.library.clone())
    }

    fn template(&self, id: &str) -> Result<Option<TaskTemplate>, StoreError> {
        Ok(self.templates.iter().find(|t| t.id == id).cloned())
    }

    fn templates_for(&self, organisation_id: &str) -> Result<Vec<TaskTemplate>, StoreError> {
        Ok(self
            .templates
            .iter()
            .filter(|t| t.organisation_id == organisation_id)
            .cloned()
            .collect())
    }

    fn tool(&self, id: &str) -> Result<Option<ObservationToolDefinition>, StoreError> {
        Ok(self.tools.iter().find(|t| t.id == id).cloned())
    }

    fn tools(&self) -> Result<Vec<ObservationToolDefinition>, StoreError> {
        Ok(self.tools.clone())
    }

    fn tools_by_ids(&self, ids: &[String]) -> Result<Vec<ObservationToolDefinition>, StoreError> {
        Ok(self
            .tools
            .iter()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect())
    }

    fn insert_completion(&mut self, completion: TaskCompletion) -> Result<(), StoreError> {
        self.completions.push(completion);
        self.flush()
    }

    fn completion_for_task(&self, task_id: &str) -> Result<Option<TaskCompletion>, StoreError> {
        Ok(self
            .completions
            .iter()
            .filter(|c| c.task_id == task_id)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    fn submission(&self, id: &str) -> Result<Option<ObservationToolSubmission>, StoreError> {
        Ok(self.submissions.iter().find(|s| s.id == id).cloned())
    }

    fn latest_submission_for_task(
        &self,
        task_id: &str,
    ) -> Result<Option<ObservationToolSubmission>, StoreError> {
        Ok(self
            .submissions
            .iter()
            .filter(|s| s.task_id.as_deref() == Some(task_id))
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    fn submissions_for_tasks(
        &self,
        task_ids: &[String],
    ) -> Result<Vec<ObservationToolSubmission>, StoreError> {
        Ok(self
            .submissions
            .iter()
            .filter(|s| s.task_id.as_ref().is_some_and(|t| task_ids.contains(t)))
            .cloned()
            .collect())
    }

    fn submission_for_appointment(
        &self,
        appointment_id: &str,
        excluding: &str,
    ) -> Result<Option<ObservationToolSubmission>, StoreError> {
        Ok(self
            .submissions
            .iter()
            .find(|s| {
                s.id != excluding && s.evaluation_appointment_id.as_deref() == Some(appointment_id)
            })
            .cloned())
    }

    fn insert_submission(&mut self, submission: ObservationToolSubmission) -> Result<(), StoreError> {
        if let Some(task_id) = &submission.task_id {
            if self
                .submissions
                .iter()
                .any(|s| s.task_id.as_ref() == Some(task_id))
            {
                return Err(StoreError::Duplicate {
                    collection: "submissions",
                    key: task_id.clone(),
                });
            }
        }
        self.submissions.push(submission);
        self.flush()
    }

    fn save_submission(&mut self, submission: &ObservationToolSubmission) -> Result<(), StoreError> {
        upsert(&mut self.submissions, submission.clone(), |s| s.id.clone());
        self.flush()
    }

    fn find_submissions(
        &self,
        query: &SubmissionQuery,
    ) -> Result<Vec<ObservationToolSubmission>, StoreError> {
        let mut found: Vec<ObservationToolSubmission> = self
            .submissions
            .iter()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}
