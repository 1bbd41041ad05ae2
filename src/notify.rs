//! Assignment notifications.
//!
//! Dispatch is fire-and-forget: the caller never waits on it and a failure is only logged.

use std::sync::Arc;
use std::thread;

use thiserror::Error;

use crate::task::Task;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Sends "you have been assigned a task" messages.
pub trait Notifier: Send + Sync {
    fn send_task_assigned(&self, task: &Task) -> Result<(), NotifyError>;
}

/// Writes assignments to the log instead of sending mail.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_task_assigned(&self, task: &Task) -> Result<(), NotifyError> {
        tracing::info!(
            task_id = %task.id,
            assigned_to = %task.assigned_to,
            due_at = %task.due_at,
            "Task assigned: {}",
            task.name
        );
        Ok(())
    }
}

/// Drops every notification.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn send_task_assigned(&self, _task: &Task) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Send the assignment notice on a background thread.
pub fn dispatch_task_assigned(notifier: Arc<dyn Notifier>, task: Task) {
    let task_id = task.id.clone();
    let spawned = thread::Builder::new()
        .name("task-notify".into())
        .spawn(move || {
            if let Err(e) = notifier.send_task_assigned(&task) {
                tracing::warn!(task_id = %task.id, "Assignment notification failed: {e}");
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(task_id = %task_id, "Could not start notification thread: {e}");
    }
}
