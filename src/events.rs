//! Reconciling background results into dashboard state.
//!
//! Every remote result is committed here or dropped here. Failures leave the
//! collections untouched and become one notice.

use crate::api::{ApiError, Project, ProjectId, Task, TaskId};
use crate::app::{Dashboard, LoadSnapshot, LoadState, Severity, SyncEvent};
use crate::background::BackgroundTask;
use crate::bulk::{BulkApplied, BulkOutcome};

pub(crate) fn handle_sync_event(dashboard: &mut Dashboard, event: SyncEvent) {
    match event {
        SyncEvent::Loaded { generation, result } => {
            handle_loaded(dashboard, generation, result);
        }
        SyncEvent::TaskCreated(result) => handle_task_created(dashboard, result),
        SyncEvent::TaskUpdated { task_id, result } => {
            handle_task_updated(dashboard, task_id, result);
        }
        SyncEvent::TaskDeleted { task_id, result } => {
            handle_task_deleted(dashboard, task_id, result);
        }
        SyncEvent::ProjectCreated(result) => handle_project_created(dashboard, result),
        SyncEvent::ProjectDeleted { project_id, result } => {
            handle_project_deleted(dashboard, project_id, result);
        }
        SyncEvent::BulkFinished(outcome) => handle_bulk_finished(dashboard, outcome),
        SyncEvent::TaskPanicked { task, error } => {
            tracing::error!(task = task.name(), error = %error, "Background task panicked");
            dashboard.set_notice(format!("Internal error in {} task", task.name()), Severity::Error);
            match task {
                BackgroundTask::Load { generation }
                    if generation == dashboard.load_generation
                        && dashboard.load_state == LoadState::Loading =>
                {
                    dashboard.load_state = LoadState::Failed;
                }
                BackgroundTask::Bulk => dashboard.bulk_in_flight = false,
                BackgroundTask::CreateTask => dashboard.creating_task = false,
                BackgroundTask::CreateProject => dashboard.creating_project = false,
                BackgroundTask::DeleteProject { project_id } => {
                    dashboard.deleting_projects.remove(&project_id);
                }
                _ => {}
            }
        }
    }
}

fn handle_loaded(
    dashboard: &mut Dashboard,
    generation: u64,
    result: Result<LoadSnapshot, ApiError>,
) {
    if generation != dashboard.load_generation {
        tracing::debug!(
            expected = dashboard.load_generation,
            got = generation,
            "Ignoring stale load result (generation mismatch)"
        );
        return;
    }

    match result {
        Ok(snapshot) => {
            tracing::debug!(
                generation,
                projects = snapshot.projects.len(),
                tasks = snapshot.tasks.len(),
                notifications = snapshot.notifications.len(),
                "Load completed"
            );
            dashboard.projects = snapshot.projects;
            dashboard.tasks = snapshot.tasks;
            dashboard.notifications = snapshot.notifications;
            dashboard.load_state = LoadState::Ready;
            dashboard.prune_to_loaded();
        }
        Err(e) => {
            // Previous collections stay as they were
            tracing::warn!(generation, error = %e, "Load failed");
            dashboard.load_state = LoadState::Failed;
            dashboard.set_notice("Failed to fetch data.", Severity::Error);
        }
    }
}

fn handle_task_created(dashboard: &mut Dashboard, result: Result<Task, ApiError>) {
    dashboard.creating_task = false;
    match result {
        Ok(task) => {
            tracing::info!(task_id = %task.id, project_id = %task.project_id, "Task created");
            dashboard.composing_task = false;
            dashboard.set_notice("Task added!", Severity::Success);
            if dashboard.matches_filter(&task) {
                dashboard.tasks.push(task);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create task");
            dashboard.set_notice("Failed to add task.", Severity::Error);
        }
    }
}

fn handle_task_updated(dashboard: &mut Dashboard, task_id: TaskId, result: Result<Task, ApiError>) {
    match result {
        Ok(task) => {
            tracing::debug!(task_id = %task_id, is_complete = task.is_complete, "Task updated");
            if dashboard.editing_task == Some(task_id) {
                dashboard.editing_task = None;
            }
            dashboard.set_notice("Task updated!", Severity::Success);
            replace_task(dashboard, task);
        }
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "Failed to update task");
            dashboard.set_notice("Failed to update task.", Severity::Error);
        }
    }
}

fn handle_task_deleted(dashboard: &mut Dashboard, task_id: TaskId, result: Result<(), ApiError>) {
    match result {
        Ok(()) => {
            tracing::info!(task_id = %task_id, "Task deleted");
            remove_task(dashboard, task_id);
            dashboard.set_notice("Task deleted.", Severity::Info);
        }
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "Failed to delete task");
            dashboard.set_notice("Failed to delete task.", Severity::Error);
        }
    }
}

fn handle_project_created(dashboard: &mut Dashboard, result: Result<Project, ApiError>) {
    dashboard.creating_project = false;
    match result {
        Ok(project) => {
            tracing::info!(project_id = %project.id, name = %project.name, "Project created");
            dashboard.composing_project = false;
            dashboard.set_notice("Project created!", Severity::Success);
            // Aggregates are server-side; fetch them rather than guess
            dashboard.reload();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create project");
            dashboard.set_notice("Failed to create project.", Severity::Error);
        }
    }
}

fn handle_project_deleted(
    dashboard: &mut Dashboard,
    project_id: ProjectId,
    result: Result<(), ApiError>,
) {
    dashboard.deleting_projects.remove(&project_id);
    match result {
        Ok(()) => {
            tracing::info!(project_id = %project_id, "Project deleted");
            if dashboard.selected_project == Some(project_id) {
                dashboard.selected_project = None;
            }
            dashboard.projects.retain(|p| p.id != project_id);
            dashboard.tasks.retain(|t| t.project_id != project_id);
            dashboard.prune_to_loaded();
            dashboard.set_notice("Project deleted!", Severity::Warning);
            dashboard.reload();
        }
        Err(e) => {
            tracing::warn!(project_id = %project_id, error = %e, "Failed to delete project");
            dashboard.set_notice("Failed to delete project.", Severity::Error);
        }
    }
}

fn handle_bulk_finished(dashboard: &mut Dashboard, outcome: BulkOutcome) {
    dashboard.bulk_in_flight = false;

    let (message, severity) = outcome.summary();
    for applied in outcome.succeeded {
        let task_id = applied.task_id();
        match applied {
            BulkApplied::Deleted(_) => remove_task(dashboard, task_id),
            BulkApplied::Completed(task) => replace_task(dashboard, task),
        }
        dashboard.selection.remove(&task_id);
    }
    // Failed ids keep their selection so the user can retry them

    dashboard.set_notice(message, severity);
}

/// Swap in the server's copy of a loaded task. A task that is no longer
/// loaded stays gone, and one that left the current filter is removed.
fn replace_task(dashboard: &mut Dashboard, task: Task) {
    let Some(i) = dashboard.tasks.iter().position(|t| t.id == task.id) else {
        tracing::debug!(task_id = %task.id, "Updated task is no longer loaded, ignoring");
        return;
    };
    if dashboard.matches_filter(&task) {
        dashboard.tasks[i] = task;
    } else {
        tracing::debug!(task_id = %task.id, "Task left the active filter, removing");
        remove_task(dashboard, task.id);
    }
}

fn remove_task(dashboard: &mut Dashboard, task_id: TaskId) {
    dashboard.tasks.retain(|t| t.id != task_id);
    dashboard.selection.remove(&task_id);
    if dashboard.editing_task == Some(task_id) {
        dashboard.editing_task = None;
    }
}
