//! Command implementations for the CLI interface.
//!
//! Each subcommand maps onto one engine operation. Results are printed as pretty JSON,
//! except task listings which default to a table.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Args, Subcommand};
use clap_complete::{generate, Shell};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::{CatalogImport, Database, SubmissionQuery};
use crate::engine::*;
use crate::error::{StoreError, TaskError, TaskResult};
use crate::fields::*;
use crate::sanitize::MedicationInput;
use crate::submission::{AppointmentLink, NewSubmission};
use crate::task::{RecurrenceInput, Reminder, Task};

#[derive(Subcommand)]
pub enum Commands {
    /// Create a task.
    Create {
        #[command(subcommand)]
        source: CreateSource,
    },

    /// Show a task and its completion record.
    Show {
        /// Task ID.
        id: String,
        /// Acting user.
        #[arg(long)]
        actor: String,
    },

    /// Apply a partial update given as JSON. Missing keys are kept, null clears.
    Update {
        /// Task ID.
        id: String,
        #[arg(long)]
        actor: String,
        /// JSON object, e.g. '{"timezone": null, "name": "Evening dose"}'.
        #[arg(long)]
        patch: String,
    },

    /// Change a task's status.
    Status {
        /// Task ID.
        id: String,
        #[arg(value_enum)]
        status: TaskStatus,
        #[arg(long)]
        actor: String,
        /// Completion answers as a JSON object.
        #[arg(long)]
        answers: Option<String>,
        #[arg(long)]
        score: Option<f64>,
        #[arg(long)]
        summary: Option<String>,
    },

    /// Attach a task to an appointment.
    Link {
        /// Task ID.
        id: String,
        appointment: String,
    },

    /// List tasks.
    List {
        #[command(subcommand)]
        scope: ListScope,
    },

    /// Submit an observation tool answer set.
    Submit {
        #[arg(long)]
        tool: String,
        #[arg(long)]
        companion: String,
        #[arg(long)]
        filled_by: String,
        /// Answers as a JSON object keyed by field key.
        #[arg(long)]
        answers: String,
        /// Bind to this task and complete it.
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        summary: Option<String>,
    },

    /// Query or link observation submissions.
    Submissions {
        #[command(subcommand)]
        action: SubmissionAction,
    },

    /// Observation preview for a task.
    Preview {
        /// Task ID.
        task: String,
    },

    /// Observation previews for every tool task under an appointment.
    Previews { appointment: String },

    /// Manage the task library, templates and observation tools.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Fields shared by every creation variant.
#[derive(Args)]
pub struct DraftArgs {
    /// Creating user.
    #[arg(long = "by")]
    pub created_by: String,
    /// Assignee.
    #[arg(long = "to")]
    pub assigned_to: String,
    /// Assigning user; defaults to the creator.
    #[arg(long)]
    pub assigned_by: Option<String>,
    /// Due: RFC 3339, YYYY-MM-DD, "YYYY-MM-DD HH:MM", "today", "tomorrow", or "in Nd/Nh/Nw".
    #[arg(long)]
    pub due: String,
    #[arg(long)]
    pub timezone: Option<String>,
    #[arg(long = "org")]
    pub organisation: Option<String>,
    #[arg(long)]
    pub appointment: Option<String>,
    #[arg(long)]
    pub companion: Option<String>,
    /// Observation tool ID.
    #[arg(long)]
    pub tool: Option<String>,
    #[arg(long)]
    pub desc: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    /// Medication as JSON, e.g. '{"name":"Meloxicam","doses":[{"time":"08:00","dosage":"1ml"}]}'.
    #[arg(long)]
    pub medication: Option<String>,
    #[arg(long, value_enum)]
    pub recurrence: Option<RecurrenceType>,
    #[arg(long)]
    pub cron: Option<String>,
    /// Recurrence end date.
    #[arg(long)]
    pub until: Option<String>,
    /// Enable a reminder this many minutes before due.
    #[arg(long)]
    pub reminder_minutes: Option<i64>,
    /// Attachment references. May be repeated.
    #[arg(long = "attachment")]
    pub attachments: Vec<String>,
}

#[derive(Subcommand)]
pub enum CreateSource {
    /// Ad-hoc task.
    Custom {
        #[arg(long, value_enum)]
        audience: Audience,
        #[arg(long)]
        category: String,
        #[arg(long)]
        name: String,
        #[command(flatten)]
        draft: DraftArgs,
    },
    /// Task from the shared library.
    Library {
        library_task_id: String,
        #[arg(long, value_enum)]
        audience: Audience,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        draft: DraftArgs,
    },
    /// Task from an organisation template (requires --org).
    Template {
        template_id: String,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        draft: DraftArgs,
    },
}

#[derive(Args)]
pub struct ListArgs {
    /// Filter by status. May be repeated.
    #[arg(long, value_enum)]
    pub status: Vec<TaskStatus>,
    /// Earliest due time (inclusive).
    #[arg(long)]
    pub from: Option<String>,
    /// Latest due time (inclusive).
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
    /// Limit number of rows printed.
    #[arg(long)]
    pub limit: Option<usize>,
    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum ListScope {
    /// Parent tasks a parent created or is assigned.
    Parent {
        parent_id: String,
        #[command(flatten)]
        args: ListArgs,
    },
    /// Employee tasks of an organisation.
    Employee {
        organisation: String,
        #[arg(long)]
        user: Option<String>,
        #[command(flatten)]
        args: ListArgs,
    },
    /// Tasks about a companion.
    Companion {
        companion: String,
        #[arg(long, value_enum)]
        audience: Option<Audience>,
        #[command(flatten)]
        args: ListArgs,
    },
    /// Tasks for the acting user, resolved through their identity.
    Mine {
        #[arg(long)]
        actor: String,
        #[arg(long = "org")]
        organisation: Option<String>,
        #[command(flatten)]
        args: ListArgs,
    },
}

#[derive(Subcommand)]
pub enum SubmissionAction {
    /// List submissions, newest first.
    List {
        #[arg(long)]
        companion: Option<String>,
        #[arg(long)]
        tool: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Attach a submission to an evaluation appointment.
    Link {
        submission: String,
        appointment: String,
        /// Refuse if another submission is already linked to the appointment.
        #[arg(long)]
        single: bool,
    },
}

#[derive(Subcommand)]
pub enum CatalogAction {
    /// Import library entries, templates, tools and parent profiles from a JSON file.
    Import { file: PathBuf },
    /// List library entries.
    Library {
        /// Include archived entries.
        #[arg(long)]
        all: bool,
    },
    /// List an organisation's templates.
    Templates {
        organisation: String,
        #[arg(long)]
        all: bool,
    },
    /// List observation tools.
    Tools {
        #[arg(long)]
        all: bool,
    },
}

/// Dispatch a parsed command against the engine.
pub fn run_command(engine: &mut TaskEngine<Database>, command: Commands) -> TaskResult<()> {
    match command {
        Commands::Create { source } => cmd_create(engine, source),
        Commands::Show { id, actor } => cmd_show(engine, &id, &actor),
        Commands::Update { id, actor, patch } => cmd_update(engine, &id, &actor, &patch),
        Commands::Status {
            id,
            status,
            actor,
            answers,
            score,
            summary,
        } => cmd_status(engine, &id, status, &actor, answers, score, summary),
        Commands::Link { id, appointment } => {
            print_json(&engine.link_to_appointment(&id, &appointment)?)
        }
        Commands::List { scope } => cmd_list(engine, scope),
        Commands::Submit {
            tool,
            companion,
            filled_by,
            answers,
            task,
            summary,
        } => {
            let input = NewSubmission {
                tool_id: tool,
                task_id: task,
                companion_id: companion,
                filled_by,
                answers: Some(parse_json_arg::<Value>("answers", &answers)?),
                summary,
            };
            print_json(&engine.submissions().create(input)?)
        }
        Commands::Submissions { action } => cmd_submissions(engine, action),
        Commands::Preview { task } => print_json(&engine.submissions().preview_for_task(&task)?),
        Commands::Previews { appointment } => {
            print_json(&engine.submissions().previews_for_appointment(&appointment)?)
        }
        Commands::Catalog { action } => cmd_catalog(engine, action),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

/// Create a task from one of the three sources.
pub fn cmd_create(engine: &mut TaskEngine<Database>, source: CreateSource) -> TaskResult<()> {
    let request = match source {
        CreateSource::Custom {
            audience,
            category,
            name,
            draft,
        } => NewTask::Custom(CustomTask {
            audience,
            category,
            name,
            draft: build_draft(draft)?,
        }),
        CreateSource::Library {
            library_task_id,
            audience,
            name,
            draft,
        } => NewTask::Library(LibraryTask {
            library_task_id,
            audience,
            name,
            draft: build_draft(draft)?,
        }),
        CreateSource::Template {
            template_id,
            name,
            draft,
        } => NewTask::OrgTemplate(TemplateTask {
            template_id,
            name,
            draft: build_draft(draft)?,
        }),
    };
    let task = engine.create(request)?;
    print_json(&task)
}

fn build_draft(args: DraftArgs) -> TaskResult<TaskDraft> {
    let due_at = parse_due_input(&args.due)?;
    let medication = args
        .medication
        .as_deref()
        .map(|m| parse_json_arg::<MedicationInput>("medication", m))
        .transpose()?;
    let end_date = args.until.as_deref().map(parse_due_input).transpose()?;
    let recurrence = args.recurrence.map(|kind| RecurrenceInput {
        kind,
        cron_expression: args.cron.clone(),
        end_date,
    });
    let reminder = args.reminder_minutes.map(|offset_minutes| Reminder {
        enabled: true,
        offset_minutes,
        scheduled_notification_id: None,
    });

    Ok(TaskDraft {
        created_by: args.created_by,
        assigned_by: args.assigned_by,
        assigned_to: args.assigned_to,
        due_at,
        timezone: args.timezone,
        organisation_id: args.organisation,
        appointment_id: args.appointment,
        companion_id: args.companion,
        observation_tool_id: args.tool,
        description: args.desc,
        additional_notes: args.notes,
        medication,
        recurrence,
        reminder,
        attachments: args.attachments,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskView {
    task: Task,
    completion: Option<crate::task::TaskCompletion>,
}

pub fn cmd_show(engine: &TaskEngine<Database>, id: &str, actor: &str) -> TaskResult<()> {
    let task = engine.get_task(id, actor)?;
    let completion = engine.get_completion(&task.id)?;
    print_json(&TaskView { task, completion })
}

pub fn cmd_update(
    engine: &mut TaskEngine<Database>,
    id: &str,
    actor: &str,
    patch: &str,
) -> TaskResult<()> {
    let update: TaskUpdate = parse_json_arg("patch", patch)?;
    print_json(&engine.update_task(id, update, actor)?)
}

pub fn cmd_status(
    engine: &mut TaskEngine<Database>,
    id: &str,
    status: TaskStatus,
    actor: &str,
    answers: Option<String>,
    score: Option<f64>,
    summary: Option<String>,
) -> TaskResult<()> {
    let answers = answers
        .as_deref()
        .map(|a| parse_json_arg::<Map<String, Value>>("answers", a))
        .transpose()?;
    let completion = (answers.is_some() || score.is_some() || summary.is_some()).then(|| {
        CompletionInput {
            filled_by: None,
            answers,
            score,
            summary,
        }
    });
    let change = engine.change_status(id, status, actor, completion)?;
    print_json(&change)
}

/// List tasks with optional filtering.
pub fn cmd_list(engine: &TaskEngine<Database>, scope: ListScope) -> TaskResult<()> {
    let (tasks, json) = match scope {
        ListScope::Parent { parent_id, args } => {
            let json = args.json;
            (engine.list_for_parent(&parent_id, list_filter(args)?)?, json)
        }
        ListScope::Employee {
            organisation,
            user,
            args,
        } => {
            let json = args.json;
            let filter = list_filter(args)?;
            (
                engine.list_for_employee(&organisation, user.as_deref(), filter)?,
                json,
            )
        }
        ListScope::Companion {
            companion,
            audience,
            args,
        } => {
            let json = args.json;
            (
                engine.list_for_companion(&companion, audience, list_filter(args)?)?,
                json,
            )
        }
        ListScope::Mine {
            actor,
            organisation,
            args,
        } => {
            let json = args.json;
            let filter = list_filter(args)?;
            let tasks =
                engine.list_for_actor(engine.store(), &actor, organisation.as_deref(), filter)?;
            (tasks, json)
        }
    };
    if json {
        print_json(&tasks)
    } else {
        print_table(&tasks);
        Ok(())
    }
}

fn list_filter(args: ListArgs) -> TaskResult<ListFilter> {
    Ok(ListFilter {
        statuses: args.status,
        due_from: args.from.as_deref().map(parse_due_input).transpose()?,
        due_to: args.to.as_deref().map(parse_due_input).transpose()?,
        offset: args.offset,
        limit: args.limit,
    })
}

pub fn cmd_submissions(
    engine: &mut TaskEngine<Database>,
    action: SubmissionAction,
) -> TaskResult<()> {
    match action {
        SubmissionAction::List {
            companion,
            tool,
            from,
            to,
        } => {
            let query = SubmissionQuery {
                companion_id: companion,
                tool_id: tool,
                from_date: from.as_deref().map(parse_due_input).transpose()?,
                to_date: to.as_deref().map(parse_due_input).transpose()?,
            };
            print_json(&engine.submissions().list(&query)?)
        }
        SubmissionAction::Link {
            submission,
            appointment,
            single,
        } => {
            let link = AppointmentLink {
                submission_id: submission,
                appointment_id: appointment,
                enforce_single_submission_per_appointment: single,
            };
            print_json(&engine.submissions().link_to_appointment(link)?)
        }
    }
}

/// Handle catalog commands.
pub fn cmd_catalog(engine: &mut TaskEngine<Database>, action: CatalogAction) -> TaskResult<()> {
    match action {
        CatalogAction::Import { file } => {
            let raw = fs::read_to_string(&file).map_err(StoreError::from)?;
            let catalog: CatalogImport = parse_json_arg("catalog file", &raw)?;
            let summary = engine.store_mut().import(catalog)?;
            tracing::info!(?summary, file = %file.display(), "Catalog imported");
            print_json(&summary)
        }
        CatalogAction::Library { all } => print_json(&engine.catalog().list_library(!all)?),
        CatalogAction::Templates { organisation, all } => {
            print_json(&engine.catalog().list_templates(&organisation, !all)?)
        }
        CatalogAction::Tools { all } => print_json(&engine.catalog().list_tools(!all)?),
    }
}

/// Write shell completions to stdout.
pub fn cmd_completions(shell: Shell) {
    use crate::cli::Cli;
    use clap::CommandFactory;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

fn print_json<T: Serialize>(value: &T) -> TaskResult<()> {
    let out = serde_json::to_string_pretty(value).map_err(StoreError::from)?;
    println!("{out}");
    Ok(())
}

fn parse_json_arg<T: serde::de::DeserializeOwned>(what: &str, raw: &str) -> TaskResult<T> {
    serde_json::from_str(raw).map_err(|e| TaskError::InvalidInput(format!("Invalid {what}: {e}")))
}

/// Parse a human-readable due time.
///
/// Supports:
/// - RFC 3339 timestamps
/// - "YYYY-MM-DD HH:MM" and "YYYY-MM-DD" (local time, midnight for bare dates)
/// - "now", "today", "tomorrow"
/// - "in 3h", "in 2d", "in 1w"
pub fn parse_due_input(s: &str) -> TaskResult<DateTime<Utc>> {
    let raw = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let lower = raw.to_lowercase();
    let now = Utc::now();
    let today = Local::now().date_naive();
    match lower.as_str() {
        "now" => return Ok(now),
        "today" => return local_midnight(today),
        "tomorrow" => return local_midnight(today + Duration::days(1)),
        _ => {}
    }

    if let Some(rest) = lower.strip_prefix("in ") {
        let rest = rest.trim();
        let split = rest.char_indices().last().map_or(0, |(i, _)| i);
        let (n, unit) = rest.split_at(split);
        if let Ok(n) = n.trim().parse::<i64>() {
            let delta = match unit {
                "h" => Some(Duration::try_hours(n)),
                "d" => Some(Duration::try_days(n)),
                "w" => Some(Duration::try_weeks(n)),
                _ => None,
            };
            if let Some(delta) = delta {
                return delta
                    .and_then(|d| now.checked_add_signed(d))
                    .ok_or_else(|| TaskError::InvalidInput(format!("Date '{s}' is out of range")));
            }
        }
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return local_to_utc(ndt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return local_midnight(date);
    }
    Err(TaskError::InvalidInput(format!(
        "Unrecognised date '{s}'. Use RFC 3339, YYYY-MM-DD, 'today', 'tomorrow', or 'in Nd'."
    )))
}

fn local_midnight(date: NaiveDate) -> TaskResult<DateTime<Utc>> {
    local_to_utc(date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

fn local_to_utc(ndt: NaiveDateTime) -> TaskResult<DateTime<Utc>> {
    Local
        .from_local_datetime(&ndt)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| TaskError::InvalidInput(format!("Time {ndt} does not exist locally")))
}

/// Format a due time relative to now ("in 3h", "2d late").
pub fn format_due_relative(due: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = due - now;
    let hours = delta.num_hours();
    if hours.abs() < 24 {
        if hours >= 0 {
            format!("in {hours}h")
        } else {
            format!("{}h late", -hours)
        }
    } else if delta.num_days() > 0 {
        format!("in {}d", delta.num_days())
    } else {
        format!("{}d late", -delta.num_days())
    }
}

fn format_audience(a: Audience) -> &'static str {
    match a {
        Audience::EmployeeTask => "Staff",
        Audience::ParentTask => "Owner",
    }
}

/// Print tasks in a formatted table.
pub fn print_table(tasks: &[Task]) {
    println!(
        "{:<36} {:<11} {:<6} {:<10} {:<12} {:<12} {}",
        "ID", "Status", "For", "Due", "Companion", "Assignee", "Name [category]"
    );
    let now = Utc::now();
    for t in tasks {
        let companion = t.companion_id.clone().unwrap_or_else(|| "-".into());
        println!(
            "{:<36} {:<11} {:<6} {:<10} {:<12} {:<12} {} [{}]",
            t.id,
            format_status(t.status),
            format_audience(t.audience),
            format_due_relative(t.due_at, now),
            clip_cell(&companion, 12),
            clip_cell(&t.assigned_to, 12),
            t.name,
            t.category
        );
    }
}

/// Clip a table cell to `width` characters, marking the cut with an ellipsis.
fn clip_cell(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut clipped: String = value.chars().take(width.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}
