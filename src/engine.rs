//! Task lifecycle: creation, partial updates, status transitions and listings.
//!
//! Every public method is one unit of work against the store. Nothing here runs in the
//! background except the assignment notification, which is fire-and-forget.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::db::{Store, TaskQuery, TaskScope};
use crate::error::{TaskError, TaskResult};
use crate::fields::*;
use crate::identity::IdentityResolver;
use crate::notify::{dispatch_task_assigned, Notifier};
use crate::patch::Patch;
use crate::resolve::{template_recurrence, template_reminder, CatalogResolver};
use crate::sanitize::{sanitize_medication, MedicationInput};
use crate::task::*;

/// Fields every creation variant accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub created_by: String,
    #[serde(default)]
    pub assigned_by: Option<String>,
    pub assigned_to: String,
    pub due_at: DateTime<Utc>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub organisation_id: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
    #[serde(default)]
    pub companion_id: Option<String>,
    #[serde(default)]
    pub observation_tool_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
    #[serde(default)]
    pub medication: Option<MedicationInput>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceInput>,
    #[serde(default)]
    pub reminder: Option<Reminder>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl TaskDraft {
    pub fn new(created_by: &str, assigned_to: &str, due_at: DateTime<Utc>) -> Self {
        TaskDraft {
            created_by: created_by.to_string(),
            assigned_by: None,
            assigned_to: assigned_to.to_string(),
            due_at,
            timezone: None,
            organisation_id: None,
            appointment_id: None,
            companion_id: None,
            observation_tool_id: None,
            description: None,
            additional_notes: None,
            medication: None,
            recurrence: None,
            reminder: None,
            attachments: Vec::new(),
        }
    }
}

/// Task instantiated from the shared library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryTask {
    pub library_task_id: String,
    pub audience: Audience,
    /// Overrides the library entry's name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub draft: TaskDraft,
}

/// Task instantiated from an organisation template. The draft's organisation must match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateTask {
    pub template_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub draft: TaskDraft,
}

/// Ad-hoc task with caller-supplied category and name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTask {
    pub audience: Audience,
    pub category: String,
    pub name: String,
    #[serde(flatten)]
    pub draft: TaskDraft,
}

/// A creation request, one variant per provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NewTask {
    Library(LibraryTask),
    OrgTemplate(TemplateTask),
    Custom(CustomTask),
}

/// Recurrence fields an update may overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceUpdate {
    #[serde(default, rename = "type")]
    pub kind: Option<RecurrenceType>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

/// Partial update. Missing keys are left alone; `null` clears nullable fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Patch<String>,
    #[serde(default)]
    pub additional_notes: Patch<String>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Patch<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub medication: Patch<MedicationInput>,
    #[serde(default)]
    pub observation_tool_id: Patch<String>,
    #[serde(default)]
    pub reminder: Patch<Reminder>,
    #[serde(default)]
    pub recurrence: Patch<RecurrenceUpdate>,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

/// Answer data attached to a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionInput {
    #[serde(default)]
    pub filled_by: Option<String>,
    #[serde(default)]
    pub answers: Option<Map<String, Value>>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Result of a status change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub task: Task,
    pub completion: Option<TaskCompletion>,
}

/// Status, due range and paging filters shared by every listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub statuses: Vec<TaskStatus>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ListFilter {
    fn into_query(self, scope: TaskScope) -> TaskQuery {
        TaskQuery {
            scope,
            statuses: self.statuses,
            due_from: self.due_from,
            due_to: self.due_to,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

/// Provenance-specific values resolved before a task is assembled.
struct Resolved {
    source: TaskSource,
    audience: Audience,
    category: String,
    name: String,
    description: Option<String>,
    library_task_id: Option<String>,
    template_id: Option<String>,
    medication: Option<MedicationInput>,
    observation_tool_id: Option<String>,
    recurrence: Option<RecurrenceInput>,
    reminder: Option<Reminder>,
}

/// The task lifecycle engine.
pub struct TaskEngine<S: Store> {
    store: S,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store> TaskEngine<S> {
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Read-only catalog lookups.
    pub fn catalog(&self) -> CatalogResolver<'_, S> {
        CatalogResolver::new(&self.store)
    }

    /// Create a task from any provenance.
    pub fn create(&mut self, request: NewTask) -> TaskResult<Task> {
        match request {
            NewTask::Library(req) => self.create_from_library(req),
            NewTask::OrgTemplate(req) => self.create_from_template(req),
            NewTask::Custom(req) => self.create_custom(req),
        }
    }

    pub fn create_from_library(&mut self, req: LibraryTask) -> TaskResult<Task> {
        let entry = self.catalog().library_task(&req.library_task_id)?;
        let resolved = Resolved {
            source: TaskSource::Library,
            audience: req.audience,
            category: entry.category,
            name: non_blank(req.name).unwrap_or(entry.name),
            description: req.draft.description.clone().or(entry.default_description),
            library_task_id: Some(entry.id),
            template_id: None,
            medication: req.draft.medication.clone(),
            observation_tool_id: req.draft.observation_tool_id.clone(),
            recurrence: req.draft.recurrence.clone(),
            reminder: req.draft.reminder.clone(),
        };
        self.finish(resolved, req.draft)
    }

    pub fn create_from_template(&mut self, req: TemplateTask) -> TaskResult<Task> {
        let Some(organisation_id) = req.draft.organisation_id.as_deref() else {
            return Err(TaskError::invalid("organisationId is required for template tasks"));
        };
        let template = self.catalog().template(&req.template_id, organisation_id)?;
        let draft = &req.draft;

        let recurrence = match &draft.recurrence {
            Some(r) => Some(r.clone()),
            None => template_recurrence(&template, draft.due_at)?,
        };
        let reminder = draft
            .reminder
            .clone()
            .or_else(|| template_reminder(&template));
        let medication = draft
            .medication
            .clone()
            .or_else(|| template.default_medication.clone().map(MedicationInput::from));

        let resolved = Resolved {
            source: TaskSource::OrgTemplate,
            audience: template.default_role.audience(),
            category: template.category,
            name: non_blank(req.name).unwrap_or(template.name),
            description: draft.description.clone().or(template.description),
            library_task_id: None,
            template_id: Some(template.id),
            medication,
            observation_tool_id: draft
                .observation_tool_id
                .clone()
                .or(template.default_observation_tool_id),
            recurrence,
            reminder,
        };
        self.finish(resolved, req.draft)
    }

    pub fn create_custom(&mut self, req: CustomTask) -> TaskResult<Task> {
        let category = non_blank(Some(req.category))
            .ok_or_else(|| TaskError::invalid("category is required for custom tasks"))?;
        let name = non_blank(Some(req.name))
            .ok_or_else(|| TaskError::invalid("name is required for custom tasks"))?;
        let resolved = Resolved {
            source: TaskSource::Custom,
            audience: req.audience,
            category,
            name,
            description: req.draft.description.clone(),
            library_task_id: None,
            template_id: None,
            medication: req.draft.medication.clone(),
            observation_tool_id: req.draft.observation_tool_id.clone(),
            recurrence: req.draft.recurrence.clone(),
            reminder: req.draft.reminder.clone(),
        };
        self.finish(resolved, req.draft)
    }

    /// Shared tail of every creation variant: validate, persist, notify.
    fn finish(&mut self, resolved: Resolved, draft: TaskDraft) -> TaskResult<Task> {
        if draft.created_by.trim().is_empty() {
            return Err(TaskError::invalid("createdBy is required"));
        }
        if draft.assigned_to.trim().is_empty() {
            return Err(TaskError::invalid("assignedTo is required"));
        }

        let medication = sanitize_medication(resolved.medication.as_ref());
        ensure_companion(
            resolved.audience,
            medication.as_ref(),
            resolved.observation_tool_id.as_deref(),
            draft.companion_id.as_deref(),
        )?;

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            audience: resolved.audience,
            source: resolved.source,
            category: resolved.category,
            name: resolved.name,
            description: resolved.description,
            additional_notes: draft.additional_notes,
            organisation_id: draft.organisation_id,
            appointment_id: draft.appointment_id,
            companion_id: draft.companion_id,
            library_task_id: resolved.library_task_id,
            template_id: resolved.template_id,
            observation_tool_id: resolved.observation_tool_id,
            assigned_by: draft.assigned_by.unwrap_or_else(|| draft.created_by.clone()),
            created_by: draft.created_by,
            assigned_to: draft.assigned_to,
            due_at: draft.due_at,
            timezone: draft.timezone,
            recurrence: build_recurrence(resolved.recurrence),
            reminder: resolved.reminder,
            medication,
            attachments: draft.attachments,
            status: TaskStatus::Pending,
            completed_at: None,
            completed_by: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_task(task.clone())?;
        tracing::info!(
            task_id = %task.id,
            source = ?task.source,
            audience = ?task.audience,
            assigned_to = %task.assigned_to,
            "Task created"
        );

        if task.audience == Audience::EmployeeTask {
            dispatch_task_assigned(Arc::clone(&self.notifier), task.clone());
        }
        Ok(task)
    }

    /// Load a task the actor participates in.
    pub fn get_task(&self, task_id: &str, actor_id: &str) -> TaskResult<Task> {
        let task = self.load(task_id)?;
        if !task.is_participant(actor_id) {
            return Err(TaskError::forbidden("Not allowed to view this task"));
        }
        Ok(task)
    }

    /// The completion record written for a task, if any.
    pub fn get_completion(&self, task_id: &str) -> TaskResult<Option<TaskCompletion>> {
        Ok(self.store.completion_for_task(task_id)?)
    }

    /// Apply a partial update on behalf of the task's creator or assignee.
    pub fn update_task(
        &mut self,
        task_id: &str,
        update: TaskUpdate,
        actor_id: &str,
    ) -> TaskResult<Task> {
        let mut task = self.load(task_id)?;
        if !task.is_participant(actor_id) {
            return Err(TaskError::forbidden("Not allowed to update this task"));
        }
        if update.assigned_to.is_some() && task.created_by != actor_id {
            return Err(TaskError::forbidden("Only the creator can reassign a task"));
        }

        if let Some(name) = update.name {
            task.name = non_blank(Some(name)).ok_or_else(|| TaskError::invalid("name cannot be empty"))?;
        }
        if let Some(category) = update.category {
            task.category = non_blank(Some(category))
                .ok_or_else(|| TaskError::invalid("category cannot be empty"))?;
        }
        if let Some(assignee) = update.assigned_to {
            task.assigned_to = non_blank(Some(assignee))
                .ok_or_else(|| TaskError::invalid("assignedTo cannot be empty"))?;
        }
        if let Some(due_at) = update.due_at {
            task.due_at = due_at;
        }
        if let Some(attachments) = update.attachments {
            task.attachments = attachments;
        }
        update.description.apply_to(&mut task.description);
        update.additional_notes.apply_to(&mut task.additional_notes);
        update.timezone.apply_to(&mut task.timezone);
        update.observation_tool_id.apply_to(&mut task.observation_tool_id);
        update.reminder.apply_to(&mut task.reminder);
        match update.medication {
            Patch::Keep => {}
            Patch::Clear => task.medication = None,
            Patch::Set(input) => task.medication = sanitize_medication(Some(&input)),
        }
        task.recurrence = merge_recurrence(task.recurrence.take(), update.recurrence)?;

        task.updated_at = Utc::now();
        self.store.save_task(&task)?;
        tracing::info!(task_id = %task.id, actor_id, "Task updated");
        Ok(task)
    }

    /// Move a task through its status state machine.
    pub fn change_status(
        &mut self,
        task_id: &str,
        new_status: TaskStatus,
        actor_id: &str,
        completion: Option<CompletionInput>,
    ) -> TaskResult<StatusChange> {
        let mut task = self.load(task_id)?;
        let from = task.status;
        // Terminal tasks are frozen for everyone, so this runs before the actor check.
        let to = next_status(from, new_status)?;
        if !task.is_participant(actor_id) {
            return Err(TaskError::forbidden("Not allowed to change this task's status"));
        }
        task.status = to;

        let now = Utc::now();
        let mut record = None;
        if task.status == TaskStatus::Completed {
            task.completed_at = Some(now);
            task.completed_by = Some(actor_id.to_string());

            if let Some(CompletionInput {
                filled_by,
                answers: Some(answers),
                score,
                summary,
            }) = completion
            {
                record = Some(TaskCompletion {
                    id: Uuid::new_v4().to_string(),
                    task_id: task.id.clone(),
                    companion_id: task.companion_id.clone(),
                    filled_by: filled_by.unwrap_or_else(|| actor_id.to_string()),
                    answers,
                    score,
                    summary,
                    created_at: now,
                });
            }
        }

        task.updated_at = now;
        self.store.save_task(&task)?;
        // Only a task that is stored as completed gets a completion record.
        if let Some(c) = &record {
            self.store.insert_completion(c.clone())?;
        }
        tracing::info!(task_id = %task.id, ?from, to = ?task.status, actor_id, "Task status changed");
        Ok(StatusChange {
            task,
            completion: record,
        })
    }

    /// Parent tasks the parent created or is assigned to.
    pub fn list_for_parent(&self, parent_id: &str, filter: ListFilter) -> TaskResult<Vec<Task>> {
        self.list(filter.into_query(TaskScope::Parent {
            parent_id: parent_id.to_string(),
        }))
    }

    /// Employee tasks of an organisation, optionally for one assignee.
    pub fn list_for_employee(
        &self,
        organisation_id: &str,
        user_id: Option<&str>,
        filter: ListFilter,
    ) -> TaskResult<Vec<Task>> {
        self.list(filter.into_query(TaskScope::Employee {
            organisation_id: organisation_id.to_string(),
            user_id: user_id.map(str::to_string),
        }))
    }

    /// Tasks about one companion, optionally for one audience.
    pub fn list_for_companion(
        &self,
        companion_id: &str,
        audience: Option<Audience>,
        filter: ListFilter,
    ) -> TaskResult<Vec<Task>> {
        self.list(filter.into_query(TaskScope::Companion {
            companion_id: companion_id.to_string(),
            audience,
        }))
    }

    /// Owners see their parent tasks; staff see their employee tasks in `organisation_id`.
    pub fn list_for_actor(
        &self,
        identity: &impl IdentityResolver,
        actor_id: &str,
        organisation_id: Option<&str>,
        filter: ListFilter,
    ) -> TaskResult<Vec<Task>> {
        let Some(resolved) = identity.resolve(actor_id)? else {
            return Err(TaskError::Unauthorized(format!("Actor {actor_id} is not recognised")));
        };
        match (resolved.parent_id, organisation_id) {
            (Some(parent_id), _) => self.list_for_parent(&parent_id, filter),
            (None, Some(org)) => self.list_for_employee(org, Some(actor_id), filter),
            (None, None) => Err(TaskError::Unauthorized(
                "Staff listings need an organisation".to_string(),
            )),
        }
    }

    fn list(&self, query: TaskQuery) -> TaskResult<Vec<Task>> {
        tracing::debug!(?query, "Listing tasks");
        Ok(self.store.find_tasks(&query)?)
    }

    /// Attach a task to an appointment.
    pub fn link_to_appointment(&mut self, task_id: &str, appointment_id: &str) -> TaskResult<Task> {
        let mut task = self.load(task_id)?;
        task.appointment_id = Some(appointment_id.to_string());
        task.updated_at = Utc::now();
        self.store.save_task(&task)?;
        tracing::info!(task_id, appointment_id, "Task linked to appointment");
        Ok(task)
    }

    fn load(&self, task_id: &str) -> TaskResult<Task> {
        self.store
            .task(task_id)?
            .ok_or_else(|| TaskError::not_found(format!("Task {task_id} not found")))
    }
}

/// Companion is mandatory for parent tasks, tasks with medication and observation tasks.
pub fn ensure_companion(
    audience: Audience,
    medication: Option<&Medication>,
    observation_tool_id: Option<&str>,
    companion_id: Option<&str>,
) -> TaskResult<()> {
    let needs_companion = audience == Audience::ParentTask
        || medication.is_some()
        || observation_tool_id.is_some();
    let has_companion = companion_id.is_some_and(|c| !c.trim().is_empty());
    if needs_companion && !has_companion {
        return Err(TaskError::invalid(
            "companionId is required for parent tasks, medication tasks and observation tasks",
        ));
    }
    Ok(())
}

/// Normalise a requested recurrence. One-off tasks never carry a rule.
pub fn build_recurrence(input: Option<RecurrenceInput>) -> Option<Recurrence> {
    let input = input?;
    Some(match input.kind {
        RecurrenceType::Once => Recurrence {
            kind: RecurrenceType::Once,
            is_master: false,
            master_task_id: None,
            cron_expression: None,
            end_date: None,
        },
        kind => Recurrence {
            kind,
            is_master: true,
            master_task_id: None,
            cron_expression: input.cron_expression,
            end_date: input.end_date,
        },
    })
}

fn merge_recurrence(
    current: Option<Recurrence>,
    update: Patch<RecurrenceUpdate>,
) -> TaskResult<Option<Recurrence>> {
    let update = match update {
        Patch::Keep => return Ok(current),
        Patch::Clear => return Ok(None),
        Patch::Set(u) => u,
    };
    match current {
        None => {
            let kind = update
                .kind
                .ok_or_else(|| TaskError::invalid("recurrence.type is required"))?;
            Ok(Some(Recurrence {
                kind,
                is_master: true,
                master_task_id: None,
                cron_expression: update.cron_expression,
                end_date: update.end_date,
            }))
        }
        Some(mut existing) => {
            if let Some(kind) = update.kind {
                existing.kind = kind;
            }
            if update.cron_expression.is_some() {
                existing.cron_expression = update.cron_expression;
            }
            if update.end_date.is_some() {
                existing.end_date = update.end_date;
            }
            Ok(Some(existing))
        }
    }
}

/// Validate a transition and return the status to store.
pub fn next_status(current: TaskStatus, requested: TaskStatus) -> TaskResult<TaskStatus> {
    if current.is_terminal() {
        return Err(TaskError::InvalidState(format!(
            "Task is already {} and cannot change status",
            format_status(current)
        )));
    }
    Ok(requested)
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
