//! Read-only catalog lookups used when creating tasks.
//!
//! Library entries are shared across organisations; templates belong to exactly one
//! organisation and may only be used from it.

use chrono::{DateTime, Duration, Utc};

use crate::db::Store;
use crate::error::{TaskError, TaskResult};
use crate::observation::ObservationToolDefinition;
use crate::task::{RecurrenceInput, Reminder, TaskLibraryDefinition, TaskTemplate};

/// Catalog resolver over a store.
pub struct CatalogResolver<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> CatalogResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Fetch an active library entry.
    pub fn library_task(&self, id: &str) -> TaskResult<TaskLibraryDefinition> {
        tracing::debug!(library_task_id = id, "Resolving library task");
        match self.store.library_task(id)? {
            Some(entry) if entry.is_active => Ok(entry),
            Some(_) => Err(TaskError::not_found(format!("Library task {id} is inactive"))),
            None => Err(TaskError::not_found(format!("Library task {id} not found"))),
        }
    }

    /// Fetch an active template belonging to `organisation_id`.
    pub fn template(&self, id: &str, organisation_id: &str) -> TaskResult<TaskTemplate> {
        tracing::debug!(template_id = id, organisation_id, "Resolving task template");
        let template = match self.store.template(id)? {
            Some(t) if t.is_active => t,
            Some(_) => return Err(TaskError::not_found(format!("Template {id} is inactive"))),
            None => return Err(TaskError::not_found(format!("Template {id} not found"))),
        };
        if template.organisation_id != organisation_id {
            return Err(TaskError::InvalidState(format!(
                "Template {id} does not belong to organisation {organisation_id}"
            )));
        }
        Ok(template)
    }

    /// Fetch an active observation tool.
    pub fn tool(&self, id: &str) -> TaskResult<ObservationToolDefinition> {
        match self.store.tool(id)? {
            Some(tool) if tool.is_active => Ok(tool),
            Some(_) => Err(TaskError::not_found(format!("Observation tool {id} is inactive"))),
            None => Err(TaskError::not_found(format!("Observation tool {id} not found"))),
        }
    }

    pub fn list_library(&self, active_only: bool) -> TaskResult<Vec<TaskLibraryDefinition>> {
        let mut entries = self.store.library()?;
        entries.retain(|e| !active_only || e.is_active);
        Ok(entries)
    }

    pub fn list_templates(
        &self,
        organisation_id: &str,
        active_only: bool,
    ) -> TaskResult<Vec<TaskTemplate>> {
        let mut templates = self.store.templates_for(organisation_id)?;
        templates.retain(|t| !active_only || t.is_active);
        Ok(templates)
    }

    pub fn list_tools(&self, active_only: bool) -> TaskResult<Vec<ObservationToolDefinition>> {
        let mut tools = self.store.tools()?;
        tools.retain(|t| !active_only || t.is_active);
        Ok(tools)
    }
}

/// Recurrence derived from a template's defaults, anchored on the task's due time.
pub fn template_recurrence(
    template: &TaskTemplate,
    due_at: DateTime<Utc>,
) -> TaskResult<Option<RecurrenceInput>> {
    let Some(defaults) = template.default_recurrence.as_ref() else {
        return Ok(None);
    };
    let end_date = match defaults.default_end_offset_days {
        Some(days) => Some(
            Duration::try_days(days)
                .and_then(|d| due_at.checked_add_signed(d))
                .ok_or_else(|| {
                    TaskError::invalid(format!(
                        "Template {} end offset of {days} days is out of range",
                        template.id
                    ))
                })?,
        ),
        None => None,
    };
    Ok(Some(RecurrenceInput {
        kind: defaults.kind,
        cron_expression: defaults.custom_cron.clone(),
        end_date,
    }))
}

/// Reminder derived from a template's default offset.
pub fn template_reminder(template: &TaskTemplate) -> Option<Reminder> {
    template
        .default_reminder_offset_minutes
        .map(|offset_minutes| Reminder {
            enabled: true,
            offset_minutes,
            scheduled_notification_id: None,
        })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::db::Database;
    use crate::fields::{DefaultRole, RecurrenceType};
    use crate::task::TemplateRecurrence;

    fn template(id: &str, org: &str, active: bool) -> TaskTemplate {
        TaskTemplate {
            id: id.into(),
            organisation_id: org.into(),
            category: "post-op".into(),
            name: "Wound check".into(),
            kind: "HYGIENE".into(),
            description: None,
            default_role: DefaultRole::Parent,
            default_medication: None,
            default_observation_tool_id: None,
            default_recurrence: Some(TemplateRecurrence {
                kind: RecurrenceType::Daily,
                custom_cron: None,
                default_end_offset_days: Some(7),
            }),
            default_reminder_offset_minutes: Some(30),
            is_active: active,
        }
    }

    fn library(id: &str, active: bool) -> TaskLibraryDefinition {
        TaskLibraryDefinition {
            id: id.into(),
            kind: "MEDICATION".into(),
            category: "medication".into(),
            name: "Give medication".into(),
            default_description: Some("Administer as prescribed".into()),
            is_active: active,
        }
    }

    #[test]
    fn test_library_lookup() {
        let mut db = Database::in_memory();
        db.library.push(library("lib-1", true));
        db.library.push(library("lib-2", false));
        let r = CatalogResolver::new(&db);

        assert_eq!(r.library_task("lib-1").unwrap().name, "Give medication");
        assert_eq!(r.library_task("lib-2").unwrap_err().status(), 404);
        assert_eq!(r.library_task("missing").unwrap_err().status(), 404);
        assert_eq!(r.list_library(true).unwrap().len(), 1);
        assert_eq!(r.list_library(false).unwrap().len(), 2);
    }

    #[test]
    fn test_template_scoped_to_organisation() {
        let mut db = Database::in_memory();
        db.templates.push(template("tpl-1", "org-1", true));
        db.templates.push(template("tpl-2", "org-1", false));
        let r = CatalogResolver::new(&db);

        assert!(r.template("tpl-1", "org-1").is_ok());
        let err = r.template("tpl-1", "org-2").unwrap_err();
        assert!(matches!(err, TaskError::InvalidState(_)));
        assert_eq!(r.template("tpl-2", "org-1").unwrap_err().status(), 404);
    }

    #[test]
    fn test_template_defaults() {
        let t = template("tpl-1", "org-1", true);
        let due = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();

        let rec = template_recurrence(&t, due).unwrap().unwrap();
        assert_eq!(rec.kind, RecurrenceType::Daily);
        assert_eq!(rec.end_date, Some(Utc.with_ymd_and_hms(2024, 6, 8, 8, 0, 0).unwrap()));

        let reminder = template_reminder(&t).unwrap();
        assert!(reminder.enabled);
        assert_eq!(reminder.offset_minutes, 30);
    }

    #[test]
    fn test_template_without_offset_leaves_end_open() {
        let mut t = template("tpl-1", "org-1", true);
        t.default_recurrence = Some(TemplateRecurrence {
            kind: RecurrenceType::Weekly,
            custom_cron: None,
            default_end_offset_days: None,
        });
        t.default_reminder_offset_minutes = None;
        let due = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        assert_eq!(template_recurrence(&t, due).unwrap().unwrap().end_date, None);
        assert_eq!(template_reminder(&t), None);
    }

    #[test]
    fn test_template_offset_out_of_range() {
        let mut t = template("tpl-1", "org-1", true);
        t.default_recurrence = Some(TemplateRecurrence {
            kind: RecurrenceType::Daily,
            custom_cron: None,
            default_end_offset_days: Some(100_000_000),
        });
        let due = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let err = template_recurrence(&t, due).unwrap_err();
        assert!(matches!(err, TaskError::InvalidInput(_)));

        t.default_recurrence = None;
        assert_eq!(template_recurrence(&t, due).unwrap(), None);
    }
}
