//! Observation submissions: task-bound validation, scoring, appointment linking and the
//! preview projections shown next to tasks.
//!
//! Creating a submission bound to a task also completes that task. The two writes are not
//! transactional; when the second one fails the submission stays and the outcome says so.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::{Store, SubmissionQuery, TaskQuery, TaskScope};
use crate::engine::{CompletionInput, TaskEngine};
use crate::error::{StoreError, TaskError, TaskResult};
use crate::fields::TaskStatus;
use crate::observation::*;
use crate::scoring::score_submission;
use crate::task::{Task, TaskCompletion};

/// Number of tool fields shown in an answers preview.
pub const PREVIEW_FIELD_LIMIT: usize = 5;

/// A filled-in tool as received from a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmission {
    #[serde(default)]
    pub tool_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub companion_id: String,
    #[serde(default)]
    pub filled_by: String,
    #[serde(default)]
    pub answers: Option<Value>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// What happened to the bound task after the submission was stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskLink {
    /// The submission is not bound to a task.
    Unbound,
    Completed {
        task: Box<Task>,
        completion: Option<TaskCompletion>,
    },
    /// The submission was stored but the task could not be completed.
    CompletionFailed { task_id: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub submission: ObservationToolSubmission,
    pub task_link: TaskLink,
}

/// Request to attach a submission to an evaluation appointment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentLink {
    pub submission_id: String,
    pub appointment_id: String,
    #[serde(default)]
    pub enforce_single_submission_per_appointment: bool,
}

/// Submission coordinator borrowing the task engine it completes tasks through.
pub struct SubmissionCoordinator<'a, S: Store> {
    engine: &'a mut TaskEngine<S>,
}

impl<S: Store> TaskEngine<S> {
    pub fn submissions(&mut self) -> SubmissionCoordinator<'_, S> {
        SubmissionCoordinator { engine: self }
    }
}

impl<'a, S: Store> SubmissionCoordinator<'a, S> {
    /// Validate, score and store a submission, completing its task when bound to one.
    pub fn create(&mut self, input: NewSubmission) -> TaskResult<SubmissionOutcome> {
        let tool_id = required(&input.tool_id, "toolId")?;
        let companion_id = required(&input.companion_id, "companionId")?;
        let filled_by = required(&input.filled_by, "filledBy")?;
        let answers = match input.answers {
            Some(Value::Object(map)) => map,
            Some(_) => return Err(TaskError::invalid("answers must be an object")),
            None => return Err(TaskError::invalid("answers is required")),
        };

        let tool = self.engine.catalog().tool(&tool_id)?;

        let task_id = input.task_id.filter(|t| !t.trim().is_empty());
        if let Some(task_id) = &task_id {
            self.check_task_binding(task_id, &tool_id, &companion_id, &filled_by)?;
        }

        let score = score_submission(&tool, &answers);
        let now = Utc::now();
        let submission = ObservationToolSubmission {
            id: Uuid::new_v4().to_string(),
            tool_id,
            task_id: task_id.clone(),
            companion_id,
            filled_by: filled_by.clone(),
            answers: answers.clone(),
            score,
            summary: input.summary.clone(),
            evaluation_appointment_id: None,
            created_at: now,
            updated_at: now,
        };

        match self.engine.store_mut().insert_submission(submission.clone()) {
            Ok(()) => {}
            Err(StoreError::Duplicate { .. }) => {
                return Err(TaskError::Conflict(
                    "Observation already submitted for this task".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            submission_id = %submission.id,
            tool_id = %submission.tool_id,
            task_id = ?submission.task_id,
            score = ?submission.score,
            "Observation submitted"
        );

        let task_link = match task_id {
            None => TaskLink::Unbound,
            Some(task_id) => {
                let completion = CompletionInput {
                    filled_by: Some(filled_by.clone()),
                    answers: Some(answers),
                    score,
                    summary: input.summary,
                };
                match self
                    .engine
                    .change_status(&task_id, TaskStatus::Completed, &filled_by, Some(completion))
                {
                    Ok(change) => TaskLink::Completed {
                        task: Box::new(change.task),
                        completion: change.completion,
                    },
                    Err(e) => {
                        tracing::warn!(
                            submission_id = %submission.id,
                            task_id = %task_id,
                            "Submission stored but task completion failed: {e}"
                        );
                        TaskLink::CompletionFailed {
                            task_id,
                            error: e.to_string(),
                        }
                    }
                }
            }
        };

        Ok(SubmissionOutcome {
            submission,
            task_link,
        })
    }

    /// Checks run in order; the first failure wins.
    fn check_task_binding(
        &self,
        task_id: &str,
        tool_id: &str,
        companion_id: &str,
        filled_by: &str,
    ) -> TaskResult<()> {
        let store = self.engine.store();
        if store.latest_submission_for_task(task_id)?.is_some() {
            return Err(TaskError::Conflict(
                "Observation already submitted for this task".to_string(),
            ));
        }
        let task = store
            .task(task_id)?
            .ok_or_else(|| TaskError::not_found(format!("Task {task_id} not found")))?;
        if task.assigned_to != filled_by {
            return Err(TaskError::forbidden("Not allowed to submit for this task"));
        }
        if task.companion_id.as_deref() != Some(companion_id) {
            return Err(TaskError::invalid("companionId mismatch with task"));
        }
        if let Some(bound_tool) = &task.observation_tool_id {
            if bound_tool != tool_id {
                return Err(TaskError::invalid("toolId mismatch with task"));
            }
        }
        Ok(())
    }

    /// Attach a submission to an evaluation appointment.
    pub fn link_to_appointment(
        &mut self,
        link: AppointmentLink,
    ) -> TaskResult<ObservationToolSubmission> {
        let store = self.engine.store_mut();
        let mut submission = store.submission(&link.submission_id)?.ok_or_else(|| {
            TaskError::not_found(format!("Submission {} not found", link.submission_id))
        })?;

        if link.enforce_single_submission_per_appointment
            && store
                .submission_for_appointment(&link.appointment_id, &submission.id)?
                .is_some()
        {
            return Err(TaskError::Conflict(format!(
                "Appointment {} already has an observation submission",
                link.appointment_id
            )));
        }

        submission.evaluation_appointment_id = Some(link.appointment_id);
        submission.updated_at = Utc::now();
        store.save_submission(&submission)?;
        tracing::info!(
            submission_id = %submission.id,
            appointment_id = ?submission.evaluation_appointment_id,
            "Submission linked to appointment"
        );
        Ok(submission)
    }

    pub fn list(&self, query: &SubmissionQuery) -> TaskResult<Vec<ObservationToolSubmission>> {
        tracing::debug!(?query, "Listing submissions");
        Ok(self.engine.store().find_submissions(query)?)
    }

    /// Tool and latest submission preview for one observation task.
    pub fn preview_for_task(&self, task_id: &str) -> TaskResult<TaskObservationPreview> {
        let store = self.engine.store();
        let task = store
            .task(task_id)?
            .ok_or_else(|| TaskError::not_found(format!("Task {task_id} not found")))?;
        let Some(tool_id) = task.observation_tool_id.as_deref() else {
            return Err(TaskError::InvalidState(format!(
                "Task {task_id} has no observation tool"
            )));
        };
        let tool = self.engine.catalog().tool(tool_id)?;
        let latest = store.latest_submission_for_task(task_id)?;
        Ok(build_preview(&task.id, &tool, latest.as_ref()))
    }

    /// One preview row per observation task under an appointment.
    pub fn previews_for_appointment(
        &self,
        appointment_id: &str,
    ) -> TaskResult<Vec<TaskObservationPreview>> {
        let store = self.engine.store();
        let tasks = store.find_tasks(&TaskQuery::new(TaskScope::AppointmentObservations {
            appointment_id: appointment_id.to_string(),
        }))?;
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let tool_ids: Vec<String> = tasks
            .iter()
            .filter_map(|t| t.observation_tool_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let task_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();

        let tools: HashMap<String, ObservationToolDefinition> = store
            .tools_by_ids(&tool_ids)?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        let mut latest: HashMap<String, ObservationToolSubmission> = HashMap::new();
        for s in store.submissions_for_tasks(&task_ids)? {
            let Some(task_id) = s.task_id.clone() else {
                continue;
            };
            match latest.get(&task_id) {
                Some(existing) if existing.created_at >= s.created_at => {}
                _ => {
                    latest.insert(task_id, s);
                }
            }
        }

        Ok(tasks
            .iter()
            .filter_map(|task| {
                let tool = tools.get(task.observation_tool_id.as_deref()?)?;
                Some(build_preview(&task.id, tool, latest.get(&task.id)))
            })
            .collect())
    }
}

fn build_preview(
    task_id: &str,
    tool: &ObservationToolDefinition,
    submission: Option<&ObservationToolSubmission>,
) -> TaskObservationPreview {
    let answers_preview = submission
        .map(|s| {
            tool.fields
                .iter()
                .take(PREVIEW_FIELD_LIMIT)
                .filter_map(|f| {
                    let value = s.answers.get(&f.key).filter(|v| !v.is_null())?;
                    Some(AnswerPreview {
                        key: f.key.clone(),
                        label: f.label.clone(),
                        value: value.clone(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    TaskObservationPreview {
        task_id: task_id.to_string(),
        tool_id: tool.id.clone(),
        tool_name: tool.name.clone(),
        tool_category: tool.category.clone(),
        submission: submission.map(|s| SubmissionSummary {
            id: s.id.clone(),
            created_at: s.created_at,
            score: s.score,
            summary: s.summary.clone(),
        }),
        answers_preview,
    }
}

fn required(value: &str, field: &str) -> TaskResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(TaskError::invalid(format!("{field} is required")));
    }
    Ok(v.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::db::Database;
    use crate::engine::{CustomTask, TaskDraft};
    use crate::fields::{Audience, FieldType};
    use crate::notify::NoopNotifier;

    fn tool_with_fields(id: &str, n: usize) -> ObservationToolDefinition {
        let fields = (1..=n)
            .map(|i| ToolField {
                key: format!("q{i}"),
                label: format!("Question {i}"),
                kind: FieldType::Choice,
                required: false,
                options: None,
                scoring: Some(FieldScoring {
                    points: None,
                    map: Some(HashMap::from([("yes".to_string(), 5.0), ("no".to_string(), 0.0)])),
                }),
            })
            .collect();
        ObservationToolDefinition {
            id: id.into(),
            name: "Mobility check".into(),
            category: "mobility".into(),
            description: None,
            fields,
            scoring_rules: None,
            is_active: true,
        }
    }

    fn setup() -> (TaskEngine<Database>, Task) {
        let mut db = Database::in_memory();
        db.tools.push(tool_with_fields("tool-1", 7));
        db.tools.push(tool_with_fields("tool-2", 1));
        let mut engine = TaskEngine::new(db, Arc::new(NoopNotifier));

        let mut draft = TaskDraft::new(
            "vet-1",
            "parent-1",
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        );
        draft.companion_id = Some("c1".into());
        draft.observation_tool_id = Some("tool-1".into());
        draft.appointment_id = Some("appt-1".into());
        let task = engine
            .create_custom(CustomTask {
                audience: Audience::ParentTask,
                category: "observation".into(),
                name: "Mobility check".into(),
                draft,
            })
            .unwrap();
        (engine, task)
    }

    fn bound(task: &Task, answers: Value) -> NewSubmission {
        NewSubmission {
            tool_id: "tool-1".into(),
            task_id: Some(task.id.clone()),
            companion_id: "c1".into(),
            filled_by: "parent-1".into(),
            answers: Some(answers),
            summary: None,
        }
    }

    #[test]
    fn test_missing_fields_rejected() {
        let (mut engine, _) = setup();
        let mut subs = engine.submissions();
        let err = subs.create(NewSubmission::default()).unwrap_err();
        assert_eq!(err.status(), 400);

        let err = subs
            .create(NewSubmission {
                tool_id: "tool-1".into(),
                companion_id: "c1".into(),
                filled_by: "parent-1".into(),
                answers: Some(json!(["not", "an", "object"])),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_unknown_or_inactive_tool() {
        let (mut engine, task) = setup();
        engine.store_mut().tools[1].is_active = false;
        let mut input = bound(&task, json!({}));
        input.tool_id = "tool-2".into();
        assert_eq!(engine.submissions().create(input).unwrap_err().status(), 404);
        let mut input = bound(&task, json!({}));
        input.tool_id = "missing".into();
        assert_eq!(engine.submissions().create(input).unwrap_err().status(), 404);
    }

    #[test]
    fn test_bound_submission_completes_task() {
        let (mut engine, task) = setup();
        let outcome = engine
            .submissions()
            .create(bound(&task, json!({"q1": "yes"})))
            .unwrap();
        assert_eq!(outcome.submission.score, Some(5.0));
        match outcome.task_link {
            TaskLink::Completed { task, completion } => {
                assert_eq!(task.status, TaskStatus::Completed);
                assert_eq!(completion.unwrap().score, Some(5.0));
            }
            other => panic!("unexpected link {other:?}"),
        }
    }

    #[test]
    fn test_second_submission_conflicts() {
        let (mut engine, task) = setup();
        engine.submissions().create(bound(&task, json!({"q1": "no"}))).unwrap();
        let err = engine
            .submissions()
            .create(bound(&task, json!({"q1": "yes"})))
            .unwrap_err();
        assert!(matches!(err, TaskError::Conflict(_)));
    }

    #[test]
    fn test_binding_checks() {
        let (mut engine, task) = setup();

        let mut input = bound(&task, json!({}));
        input.task_id = Some("missing".into());
        assert_eq!(engine.submissions().create(input).unwrap_err().status(), 404);

        let mut input = bound(&task, json!({}));
        input.filled_by = "vet-1".into();
        assert_eq!(engine.submissions().create(input).unwrap_err().status(), 403);

        let mut input = bound(&task, json!({}));
        input.companion_id = "c2".into();
        assert_eq!(engine.submissions().create(input).unwrap_err().status(), 400);

        let mut input = bound(&task, json!({}));
        input.tool_id = "tool-2".into();
        let err = engine.submissions().create(input).unwrap_err();
        assert!(err.to_string().contains("toolId"));
    }

    #[test]
    fn test_completion_failure_is_reported() {
        let (mut engine, task) = setup();
        engine
            .change_status(&task.id, TaskStatus::Cancelled, "vet-1", None)
            .unwrap();
        let outcome = engine
            .submissions()
            .create(bound(&task, json!({"q1": "yes"})))
            .unwrap();
        assert!(matches!(outcome.task_link, TaskLink::CompletionFailed { .. }));
        assert_eq!(engine.store().submissions.len(), 1);
    }

    #[test]
    fn test_unbound_submission() {
        let (mut engine, _) = setup();
        let outcome = engine
            .submissions()
            .create(NewSubmission {
                tool_id: "tool-1".into(),
                companion_id: "c9".into(),
                filled_by: "vet-3".into(),
                answers: Some(json!({"q2": "maybe"})),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(outcome.task_link, TaskLink::Unbound);
        assert_eq!(outcome.submission.score, None);
    }

    #[test]
    fn test_appointment_link_enforcement() {
        let (mut engine, _) = setup();
        let mut ids = Vec::new();
        for companion in ["c1", "c2"] {
            let outcome = engine
                .submissions()
                .create(NewSubmission {
                    tool_id: "tool-1".into(),
                    companion_id: companion.into(),
                    filled_by: "vet-1".into(),
                    answers: Some(json!({})),
                    ..Default::default()
                })
                .unwrap();
            ids.push(outcome.submission.id);
        }

        let mut subs = engine.submissions();
        let linked = subs
            .link_to_appointment(AppointmentLink {
                submission_id: ids[0].clone(),
                appointment_id: "appt-9".into(),
                enforce_single_submission_per_appointment: true,
            })
            .unwrap();
        assert_eq!(linked.evaluation_appointment_id.as_deref(), Some("appt-9"));

        // Re-linking the same submission is fine.
        subs.link_to_appointment(AppointmentLink {
            submission_id: ids[0].clone(),
            appointment_id: "appt-9".into(),
            enforce_single_submission_per_appointment: true,
        })
        .unwrap();

        let err = subs
            .link_to_appointment(AppointmentLink {
                submission_id: ids[1].clone(),
                appointment_id: "appt-9".into(),
                enforce_single_submission_per_appointment: true,
            })
            .unwrap_err();
        assert_eq!(err.status(), 409);

        subs.link_to_appointment(AppointmentLink {
            submission_id: ids[1].clone(),
            appointment_id: "appt-9".into(),
            enforce_single_submission_per_appointment: false,
        })
        .unwrap();

        let err = subs
            .link_to_appointment(AppointmentLink {
                submission_id: "missing".into(),
                appointment_id: "appt-9".into(),
                enforce_single_submission_per_appointment: false,
            })
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_list_filters() {
        let (mut engine, _) = setup();
        for (companion, tool) in [("c1", "tool-1"), ("c1", "tool-2"), ("c2", "tool-1")] {
            engine
                .submissions()
                .create(NewSubmission {
                    tool_id: tool.into(),
                    companion_id: companion.into(),
                    filled_by: "vet-1".into(),
                    answers: Some(json!({})),
                    ..Default::default()
                })
                .unwrap();
        }
        let subs = engine.submissions();
        let q = SubmissionQuery {
            companion_id: Some("c1".into()),
            ..Default::default()
        };
        assert_eq!(subs.list(&q).unwrap().len(), 2);
        let q = SubmissionQuery {
            companion_id: Some("c1".into()),
            tool_id: Some("tool-1".into()),
            ..Default::default()
        };
        assert_eq!(subs.list(&q).unwrap().len(), 1);
        let q = SubmissionQuery {
            from_date: Some(Utc::now() + chrono::Duration::days(1)),
            ..Default::default()
        };
        assert!(subs.list(&q).unwrap().is_empty());
    }

    #[test]
    fn test_preview_limits_to_first_five_fields() {
        let (mut engine, task) = setup();
        let answers = json!({"q1": "yes", "q3": "no", "q4": null, "q6": "yes", "q7": "yes"});
        engine.submissions().create(bound(&task, answers)).unwrap();

        let preview = engine.submissions().preview_for_task(&task.id).unwrap();
        let keys: Vec<&str> = preview.answers_preview.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["q1", "q3"]);
        assert_eq!(preview.tool_name, "Mobility check");
        assert_eq!(preview.submission.unwrap().score, Some(15.0));
    }

    #[test]
    fn test_preview_errors() {
        let (mut engine, task) = setup();
        assert_eq!(
            engine.submissions().preview_for_task("missing").unwrap_err().status(),
            404
        );

        let mut plain = task.clone();
        plain.id = "plain".into();
        plain.observation_tool_id = None;
        engine.store_mut().save_task(&plain).unwrap();
        let err = engine.submissions().preview_for_task("plain").unwrap_err();
        assert!(matches!(err, TaskError::InvalidState(_)));

        let preview = engine.submissions().preview_for_task(&task.id).unwrap();
        assert_eq!(preview.submission, None);
        assert!(preview.answers_preview.is_empty());
    }

    #[test]
    fn test_previews_for_appointment() {
        let (mut engine, task) = setup();
        assert!(engine
            .submissions()
            .previews_for_appointment("appt-empty")
            .unwrap()
            .is_empty());

        let mut orphan = task.clone();
        orphan.id = "orphan".into();
        orphan.observation_tool_id = Some("deleted-tool".into());
        engine.store_mut().save_task(&orphan).unwrap();

        let mut no_tool = task.clone();
        no_tool.id = "no-tool".into();
        no_tool.observation_tool_id = None;
        engine.store_mut().save_task(&no_tool).unwrap();

        engine
            .submissions()
            .create(bound(&task, json!({"q2": "yes"})))
            .unwrap();

        let rows = engine.submissions().previews_for_appointment("appt-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].task_id, task.id);
        assert_eq!(rows[0].answers_preview.len(), 1);
    }
}
