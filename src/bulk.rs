//! Bulk operations over a set of selected tasks.
//!
//! One remote call per task, at most [`MAX_CONCURRENT_REQUESTS`] in flight.
//! Every call settles before the outcome is reported; failures never cancel
//! the rest of the batch.

use futures::stream::{self, StreamExt};

use crate::api::{ApiClient, ApiError, Task, TaskId, TaskUpdate};
use crate::app::Severity;

pub const MAX_CONCURRENT_REQUESTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Delete,
    Complete,
    /// Reassign to another project. Not supported by the task API yet, so it
    /// only clears the selection.
    Move,
}

impl BulkAction {
    fn verb(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Complete => "complete",
            Self::Move => "move",
        }
    }
}

/// One successful remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkApplied {
    Deleted(TaskId),
    /// Canonical task returned by the server.
    Completed(Task),
}

impl BulkApplied {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Deleted(id) => *id,
            Self::Completed(task) => task.id,
        }
    }
}

/// Settled result of a whole batch.
#[derive(Debug)]
pub struct BulkOutcome {
    pub action: BulkAction,
    pub succeeded: Vec<BulkApplied>,
    pub failed: Vec<(TaskId, ApiError)>,
}

impl BulkOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Single user-facing message for the batch.
    pub fn summary(&self) -> (String, Severity) {
        if self.action == BulkAction::Move {
            return ("Move not implemented.".to_string(), Severity::Info);
        }

        let total = self.total();
        let failed = self.failed.len();
        if failed == 0 {
            let message = match self.action {
                BulkAction::Delete => format!("{} {} deleted.", total, tasks_noun(total)),
                _ => format!("{} {} marked complete.", total, tasks_noun(total)),
            };
            let severity = match self.action {
                BulkAction::Delete => Severity::Info,
                _ => Severity::Success,
            };
            (message, severity)
        } else if failed == total {
            (
                format!(
                    "Failed to {} {} {}.",
                    self.action.verb(),
                    total,
                    tasks_noun(total)
                ),
                Severity::Error,
            )
        } else {
            (
                format!(
                    "{} of {} tasks failed to {}.",
                    failed,
                    total,
                    self.action.verb()
                ),
                Severity::Warning,
            )
        }
    }
}

fn tasks_noun(n: usize) -> &'static str {
    if n == 1 {
        "task"
    } else {
        "tasks"
    }
}

/// Apply `action` to every id and wait for all calls to settle.
///
/// `Move` issues no calls and returns an empty outcome.
pub async fn run_bulk(api: &ApiClient, action: BulkAction, ids: Vec<TaskId>) -> BulkOutcome {
    let mut outcome = BulkOutcome {
        action,
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    if action == BulkAction::Move {
        return outcome;
    }

    let total = ids.len();
    let results: Vec<(TaskId, Result<BulkApplied, ApiError>)> = stream::iter(ids)
        .map(|id| async move {
            let result = if action == BulkAction::Delete {
                api.delete_task(id).await.map(|()| BulkApplied::Deleted(id))
            } else {
                api.update_task(id, &TaskUpdate::completion(true))
                    .await
                    .map(BulkApplied::Completed)
            };
            (id, result)
        })
        .buffer_unordered(MAX_CONCURRENT_REQUESTS)
        .collect()
        .await;

    for (id, result) in results {
        match result {
            Ok(applied) => outcome.succeeded.push(applied),
            Err(e) => {
                tracing::warn!(task_id = %id, action = action.verb(), error = %e, "Bulk request failed");
                outcome.failed.push((id, e));
            }
        }
    }

    tracing::info!(
        action = action.verb(),
        total,
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        "Bulk operation settled"
    );
    outcome
}
