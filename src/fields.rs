//! Enumerations and field types for care tasks.
//!
//! This module defines the structured values used to classify tasks and observation
//! fields: audiences, provenance, lifecycle status, recurrence kinds, template roles and
//! observation field types.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Who a task is directed at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Audience {
    /// Clinic staff.
    EmployeeTask,
    /// The companion's owner.
    ParentTask,
}

/// Which catalog a task was instantiated from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskSource {
    Library,
    OrgTemplate,
    Custom,
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Completed and cancelled tasks accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

/// Recurrence cadence stored on a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceType {
    Once,
    Daily,
    Weekly,
    Custom,
}

/// Default assignee role declared by an organisation template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefaultRole {
    Employee,
    Parent,
}

impl DefaultRole {
    /// The audience a task created from a template with this role gets.
    pub fn audience(self) -> Audience {
        match self {
            DefaultRole::Employee => Audience::EmployeeTask,
            DefaultRole::Parent => Audience::ParentTask,
        }
    }
}

/// Answer type of a field on an observation tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Text,
    Number,
    Choice,
    Boolean,
    Photo,
    Video,
}

/// Format a task status for display.
pub fn format_status(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "Pending",
        TaskStatus::InProgress => "In Progress",
        TaskStatus::Completed => "Completed",
        TaskStatus::Cancelled => "Cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&Audience::ParentTask).unwrap(),
            "\"PARENT_TASK\""
        );
        assert_eq!(
            serde_json::from_str::<TaskStatus>("\"IN_PROGRESS\"").unwrap(),
            TaskStatus::InProgress
        );
        assert!(serde_json::from_str::<TaskStatus>("\"ARCHIVED\"").is_err());
    }

    #[test]
    fn test_role_maps_to_audience() {
        assert_eq!(DefaultRole::Parent.audience(), Audience::ParentTask);
        assert_eq!(DefaultRole::Employee.audience(), Audience::EmployeeTask);
    }
}
