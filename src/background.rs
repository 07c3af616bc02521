//! Spawning remote calls as background tasks that report through the event
//! channel.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;

use crate::api::{ApiClient, ApiError, ProjectId};
use crate::app::{LoadSnapshot, SyncEvent};

/// Which kind of background task produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundTask {
    Load { generation: u64 },
    CreateTask,
    UpdateTask,
    DeleteTask,
    CreateProject,
    DeleteProject { project_id: ProjectId },
    Bulk,
}

impl BackgroundTask {
    pub fn name(self) -> &'static str {
        match self {
            Self::Load { .. } => "load",
            Self::CreateTask => "create task",
            Self::UpdateTask => "update task",
            Self::DeleteTask => "delete task",
            Self::CreateProject => "create project",
            Self::DeleteProject { .. } => "delete project",
            Self::Bulk => "bulk",
        }
    }
}

/// Wraps a future to catch panics and convert them to errors.
///
/// Without this a panicking spawned task just disappears and its event is
/// never delivered. Here the panic message comes back as `Err(String)`.
pub(crate) async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                format!("Unknown panic: {:?}", (*panic).type_id())
            }
        })
}

/// Run `future` on the runtime and deliver its event, or a
/// [`SyncEvent::TaskPanicked`] if it panics.
pub(crate) fn spawn_reported<F>(
    task: BackgroundTask,
    tx: mpsc::Sender<SyncEvent>,
    future: F,
) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = SyncEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let event = match catch_task_panic(future).await {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(task = task.name(), error = %error, "Background task panicked");
                SyncEvent::TaskPanicked { task, error }
            }
        };
        if let Err(e) = tx.send(event).await {
            tracing::warn!(task = task.name(), error = %e, "Channel send failed (receiver dropped)");
        }
    })
}

/// Fetch projects, filtered tasks and notifications concurrently.
///
/// All three must succeed; the first failure wins and the rest are dropped.
pub(crate) async fn fetch_snapshot(
    api: &ApiClient,
    filter: Option<ProjectId>,
) -> Result<LoadSnapshot, ApiError> {
    let (projects, tasks, notifications) = tokio::try_join!(
        api.list_projects(),
        api.list_tasks(filter),
        api.list_notifications()
    )?;
    Ok(LoadSnapshot {
        projects,
        tasks,
        notifications,
    })
}
