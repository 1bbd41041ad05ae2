//! Task data structures and catalog entries.
//!
//! This module defines the `Task` struct that represents a single unit of care work bound
//! to one assignee, the sub-records it carries (recurrence, reminder, medication), the
//! append-only `TaskCompletion`, and the two catalogs tasks are instantiated from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fields::*;

/// A unit of care work with scheduling, clinical payload and lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub audience: Audience,
    pub source: TaskSource,
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,

    #[serde(default)]
    pub organisation_id: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
    #[serde(default)]
    pub companion_id: Option<String>,
    #[serde(default)]
    pub library_task_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub observation_tool_id: Option<String>,

    pub created_by: String,
    pub assigned_by: String,
    pub assigned_to: String,

    pub due_at: DateTime<Utc>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub reminder: Option<Reminder>,

    #[serde(default)]
    pub medication: Option<Medication>,
    #[serde(default)]
    pub attachments: Vec<String>,

    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_by: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Whether `actor` created the task or is its assignee.
    pub fn is_participant(&self, actor: &str) -> bool {
        self.created_by == actor || self.assigned_to == actor
    }
}

/// Recurrence metadata. Instances are never scheduled here; only the rule is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    pub is_master: bool,
    #[serde(default)]
    pub master_task_id: Option<String>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

/// Recurrence as requested by a caller, before normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceInput {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

/// Reminder settings; delivery is handled elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub enabled: bool,
    pub offset_minutes: i64,
    #[serde(default)]
    pub scheduled_notification_id: Option<String>,
}

/// Canonical medication payload. Produced only by [`crate::sanitize::sanitize_medication`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub doses: Vec<Dose>,
}

/// One dose row. `time` is always `HH:mm` when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Dose {
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Immutable record written when a task is completed with answers attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub id: String,
    pub task_id: String,
    #[serde(default)]
    pub companion_id: Option<String>,
    pub filled_by: String,
    #[serde(default)]
    pub answers: Map<String, Value>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Shared catalog entry supplying defaults for library-sourced tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLibraryDefinition {
    pub id: String,
    pub kind: String,
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub default_description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Organisation-scoped template for creating tasks with predefined values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub id: String,
    pub organisation_id: String,
    pub category: String,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    pub default_role: DefaultRole,
    #[serde(default)]
    pub default_medication: Option<Medication>,
    #[serde(default)]
    pub default_observation_tool_id: Option<String>,
    #[serde(default)]
    pub default_recurrence: Option<TemplateRecurrence>,
    #[serde(default)]
    pub default_reminder_offset_minutes: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Recurrence defaults carried by a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRecurrence {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    #[serde(default)]
    pub custom_cron: Option<String>,
    #[serde(default)]
    pub default_end_offset_days: Option<i64>,
}

fn default_true() -> bool {
    true
}
