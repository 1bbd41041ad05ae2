//! Observation tools, submissions and the preview projections built from them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fields::FieldType;

/// A reusable structured-answer form with optional per-field scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationToolDefinition {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<ToolField>,
    #[serde(default)]
    pub scoring_rules: Option<ScoringRules>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// One question on a tool. `key` is unique within the tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolField {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub scoring: Option<FieldScoring>,
}

/// Scoring rule for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FieldScoring {
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default)]
    pub map: Option<HashMap<String, f64>>,
}

/// Tool-level scoring settings. `custom_formula` is stored but never evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRules {
    #[serde(default)]
    pub sum_fields: Option<bool>,
    #[serde(default)]
    pub custom_formula: Option<String>,
}

/// A filled-in observation tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationToolSubmission {
    pub id: String,
    pub tool_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub companion_id: String,
    pub filled_by: String,
    #[serde(default)]
    pub answers: Map<String, Value>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub evaluation_appointment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact view of a task's observation tool and its latest submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskObservationPreview {
    pub task_id: String,
    pub tool_id: String,
    pub tool_name: String,
    pub tool_category: String,
    #[serde(default)]
    pub submission: Option<SubmissionSummary>,
    #[serde(default)]
    pub answers_preview: Vec<AnswerPreview>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPreview {
    pub key: String,
    pub label: String,
    pub value: Value,
}

fn default_true() -> bool {
    true
}
