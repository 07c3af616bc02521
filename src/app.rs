use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::api::{
    ApiClient, ApiError, NewProject, NewTask, Project, ProjectId, Task, TaskId, TaskUpdate,
};
use crate::background::{fetch_snapshot, spawn_reported, BackgroundTask};
use crate::bulk::{run_bulk, BulkAction, BulkOutcome};

/// Header title when no project filter is active.
pub const ALL_TASKS_TITLE: &str = "All Tasks";

/// Notices disappear after this long.
pub const NOTICE_TTL: Duration = Duration::from_secs(4);

/// Capacity of the background event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Errors
// ============================================================================

/// Reasons an intent is refused before any request is sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("A bulk operation is already in progress")]
    BulkInFlight,

    #[error("A task is already being created")]
    TaskCreateInFlight,

    #[error("A project is already being created")]
    ProjectCreateInFlight,

    #[error("Project {0} is already being deleted")]
    ProjectDeleteInFlight(ProjectId),

    #[error("No tasks selected")]
    EmptySelection,

    #[error("Task {0} is not loaded")]
    UnknownTask(TaskId),
}

// ============================================================================
// State Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// What the main content area should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentView {
    /// Skeleton placeholder while a load is outstanding.
    Loading,
    /// No projects exist yet ("Create a project to begin.").
    NoProjects,
    /// Projects exist but the current filter has no tasks.
    Empty,
    Tasks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

/// Transient user-facing message.
#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
    shown_at: Instant,
}

/// Result of one bulk load: all three collections from the same round.
#[derive(Debug, Clone, Default)]
pub struct LoadSnapshot {
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub notifications: Vec<Task>,
}

/// Events from background tasks
#[derive(Debug)]
pub enum SyncEvent {
    /// Bulk load settled.
    ///
    /// `generation` is the load counter at spawn time; results from older
    /// generations are discarded.
    Loaded {
        generation: u64,
        result: Result<LoadSnapshot, ApiError>,
    },
    TaskCreated(Result<Task, ApiError>),
    TaskUpdated {
        task_id: TaskId,
        result: Result<Task, ApiError>,
    },
    TaskDeleted {
        task_id: TaskId,
        result: Result<(), ApiError>,
    },
    ProjectCreated(Result<Project, ApiError>),
    ProjectDeleted {
        project_id: ProjectId,
        result: Result<(), ApiError>,
    },
    BulkFinished(BulkOutcome),
    /// A background task panicked.
    TaskPanicked { task: BackgroundTask, error: String },
}

// ============================================================================
// Dashboard
// ============================================================================

/// In-memory view of the remote task store for one session.
///
/// Intents spawn requests and return immediately; nothing changes until the
/// matching [`SyncEvent`] is passed to [`Dashboard::handle_event`]. Only the
/// owner of the event receiver mutates this struct.
pub struct Dashboard {
    pub(crate) api: ApiClient,
    pub(crate) event_tx: mpsc::Sender<SyncEvent>,

    pub(crate) projects: Vec<Project>,
    pub(crate) tasks: Vec<Task>,
    /// Server-computed overdue projection. Replaced only by a load.
    pub(crate) notifications: Vec<Task>,

    /// Active project filter. `None` shows all tasks.
    pub(crate) selected_project: Option<ProjectId>,
    pub(crate) load_state: LoadState,
    /// Incremented on every load; see [`SyncEvent::Loaded`].
    pub(crate) load_generation: u64,

    /// Task ids marked for bulk action. Always a subset of `tasks`.
    pub(crate) selection: BTreeSet<TaskId>,

    pub(crate) composing_task: bool,
    pub(crate) composing_project: bool,
    pub(crate) editing_task: Option<TaskId>,
    pub(crate) bulk_in_flight: bool,
    pub(crate) creating_task: bool,
    pub(crate) creating_project: bool,
    pub(crate) deleting_projects: BTreeSet<ProjectId>,

    pub(crate) notice: Option<Notice>,

    /// Spawned tasks whose event has not been handled yet.
    pub(crate) pending: usize,
}

impl Dashboard {
    /// Create an empty dashboard and the receiver its background tasks report to.
    pub fn new(api: ApiClient) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let dashboard = Self {
            api,
            event_tx,
            projects: Vec::new(),
            tasks: Vec::new(),
            notifications: Vec::new(),
            selected_project: None,
            load_state: LoadState::Idle,
            load_generation: 0,
            selection: BTreeSet::new(),
            composing_task: false,
            composing_project: false,
            editing_task: None,
            bulk_in_flight: false,
            creating_task: false,
            creating_project: false,
            deleting_projects: BTreeSet::new(),
            notice: None,
            pending: 0,
        };
        (dashboard, event_rx)
    }

    /// Apply a background event.
    pub fn handle_event(&mut self, event: SyncEvent) {
        self.pending = self.pending.saturating_sub(1);
        crate::events::handle_sync_event(self, event);
    }

    /// Whether any spawned request has not reported back yet.
    pub fn has_pending(&self) -> bool {
        self.pending > 0
    }

    fn spawn<F>(&mut self, task: BackgroundTask, future: F)
    where
        F: std::future::Future<Output = SyncEvent> + Send + 'static,
    {
        self.pending += 1;
        spawn_reported(task, self.event_tx.clone(), future);
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Start a bulk load for the current filter. Any load already in flight
    /// becomes stale. Returns the new generation.
    pub fn reload(&mut self) -> u64 {
        self.load_generation += 1;
        let generation = self.load_generation;
        let filter = self.selected_project;
        self.load_state = LoadState::Loading;

        tracing::debug!(generation, filter = ?filter, "Starting bulk load");
        let api = self.api.clone();
        self.spawn(BackgroundTask::Load { generation }, async move {
            let result = fetch_snapshot(&api, filter).await;
            SyncEvent::Loaded { generation, result }
        });
        generation
    }

    /// Change the project filter and reload.
    pub fn select_project(&mut self, project: Option<ProjectId>) {
        self.selected_project = project;
        self.reload();
    }

    // ========================================================================
    // Task Intents
    // ========================================================================

    /// Send a new task. The collection changes only once the server answers.
    ///
    /// Refused while a previous create is outstanding.
    pub fn create_task(&mut self, mut task: NewTask) -> Result<(), SyncError> {
        if self.creating_task {
            return Err(SyncError::TaskCreateInFlight);
        }
        task.title = non_blank(&task.title, "Task title cannot be empty.")?;
        self.creating_task = true;

        let api = self.api.clone();
        self.spawn(BackgroundTask::CreateTask, async move {
            SyncEvent::TaskCreated(api.create_task(&task).await)
        });
        Ok(())
    }

    /// Send a partial update for a loaded task. An empty update sends nothing.
    pub fn update_task(&mut self, task_id: TaskId, mut update: TaskUpdate) -> Result<(), SyncError> {
        if self.task(task_id).is_none() {
            return Err(SyncError::UnknownTask(task_id));
        }
        if let Some(title) = &update.title {
            update.title = Some(non_blank(title, "Task title cannot be empty.")?);
        }
        if update.is_empty() {
            tracing::debug!(task_id = %task_id, "Update has no changes, skipping request");
            if self.editing_task == Some(task_id) {
                self.editing_task = None;
            }
            return Ok(());
        }

        let api = self.api.clone();
        self.spawn(BackgroundTask::UpdateTask, async move {
            let result = api.update_task(task_id, &update).await;
            SyncEvent::TaskUpdated { task_id, result }
        });
        Ok(())
    }

    /// Save an edited copy of a loaded task, sending only the changed fields.
    pub fn save_edit(&mut self, edited: &Task) -> Result<(), SyncError> {
        let current = self
            .task(edited.id)
            .ok_or(SyncError::UnknownTask(edited.id))?;
        let update = TaskUpdate::between(current, edited);
        self.update_task(edited.id, update)
    }

    /// Flip completion of a loaded task.
    pub fn toggle_complete(&mut self, task_id: TaskId) -> Result<(), SyncError> {
        let is_complete = self
            .task(task_id)
            .map(|t| t.is_complete)
            .ok_or(SyncError::UnknownTask(task_id))?;
        self.update_task(task_id, TaskUpdate::completion(!is_complete))
    }

    pub fn delete_task(&mut self, task_id: TaskId) -> Result<(), SyncError> {
        if self.task(task_id).is_none() {
            return Err(SyncError::UnknownTask(task_id));
        }

        let api = self.api.clone();
        self.spawn(BackgroundTask::DeleteTask, async move {
            let result = api.delete_task(task_id).await;
            SyncEvent::TaskDeleted { task_id, result }
        });
        Ok(())
    }

    // ========================================================================
    // Project Intents
    // ========================================================================

    pub fn create_project(&mut self, name: &str, color: Option<&str>) -> Result<(), SyncError> {
        if self.creating_project {
            return Err(SyncError::ProjectCreateInFlight);
        }
        let name = non_blank(name, "Project name cannot be empty.")?;
        let mut project = NewProject::new(name);
        if let Some(color) = color {
            project = project.with_color(color);
        }
        self.creating_project = true;

        let api = self.api.clone();
        self.spawn(BackgroundTask::CreateProject, async move {
            SyncEvent::ProjectCreated(api.create_project(&project).await)
        });
        Ok(())
    }

    /// Delete a project. The server removes its tasks too.
    pub fn delete_project(&mut self, project_id: ProjectId) -> Result<(), SyncError> {
        if !self.deleting_projects.insert(project_id) {
            return Err(SyncError::ProjectDeleteInFlight(project_id));
        }

        let api = self.api.clone();
        self.spawn(BackgroundTask::DeleteProject { project_id }, async move {
            let result = api.delete_project(project_id).await;
            SyncEvent::ProjectDeleted { project_id, result }
        });
        Ok(())
    }

    // ========================================================================
    // Selection and Bulk
    // ========================================================================

    /// Toggle one task in the selection. Ids that are not loaded are ignored.
    /// Returns whether the task is selected afterwards.
    pub fn toggle_selected(&mut self, task_id: TaskId) -> bool {
        if self.task(task_id).is_none() {
            return false;
        }
        if !self.selection.remove(&task_id) {
            self.selection.insert(task_id);
            return true;
        }
        false
    }

    pub fn select_all(&mut self) {
        self.selection = self.tasks.iter().map(|t| t.id).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Apply `action` to every selected task.
    ///
    /// Rejected while a previous batch is outstanding. `Move` only clears the
    /// selection.
    pub fn bulk_apply(&mut self, action: BulkAction) -> Result<(), SyncError> {
        if self.bulk_in_flight {
            return Err(SyncError::BulkInFlight);
        }
        if self.selection.is_empty() {
            return Err(SyncError::EmptySelection);
        }
        if action == BulkAction::Move {
            self.selection.clear();
            self.set_notice("Move not implemented.", Severity::Info);
            return Ok(());
        }

        let ids: Vec<TaskId> = self.selection.iter().copied().collect();
        tracing::info!(action = ?action, count = ids.len(), "Starting bulk operation");
        self.bulk_in_flight = true;

        let api = self.api.clone();
        self.spawn(BackgroundTask::Bulk, async move {
            SyncEvent::BulkFinished(run_bulk(&api, action, ids).await)
        });
        Ok(())
    }

    // ========================================================================
    // Form Flags
    // ========================================================================

    pub fn set_composing_task(&mut self, composing: bool) {
        self.composing_task = composing;
    }

    pub fn set_composing_project(&mut self, composing: bool) {
        self.composing_project = composing;
    }

    /// Open the editor for a loaded task.
    pub fn begin_edit(&mut self, task_id: TaskId) -> Result<(), SyncError> {
        if self.task(task_id).is_none() {
            return Err(SyncError::UnknownTask(task_id));
        }
        self.editing_task = Some(task_id);
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.editing_task = None;
    }

    // ========================================================================
    // Notices
    // ========================================================================

    /// Show a notice (auto-expires after [`NOTICE_TTL`]).
    pub fn set_notice(&mut self, message: impl Into<String>, severity: Severity) {
        self.notice = Some(Notice {
            message: message.into(),
            severity,
            shown_at: Instant::now(),
        });
    }

    /// Clear the notice if it has expired. Returns true if one was cleared.
    pub fn clear_expired_notice(&mut self) -> bool {
        if let Some(notice) = &self.notice {
            if notice.shown_at.elapsed() >= NOTICE_TTL {
                self.notice = None;
                return true;
            }
        }
        false
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    // ========================================================================
    // Read Access
    // ========================================================================

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn notifications(&self) -> &[Task] {
        &self.notifications
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.len()
    }

    pub fn selected_project(&self) -> Option<ProjectId> {
        self.selected_project
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn generation(&self) -> u64 {
        self.load_generation
    }

    pub fn selection(&self) -> &BTreeSet<TaskId> {
        &self.selection
    }

    pub fn is_selected(&self, task_id: TaskId) -> bool {
        self.selection.contains(&task_id)
    }

    pub fn is_composing_task(&self) -> bool {
        self.composing_task
    }

    pub fn is_composing_project(&self) -> bool {
        self.composing_project
    }

    pub fn editing_task(&self) -> Option<&Task> {
        self.editing_task.and_then(|id| self.task(id))
    }

    pub fn is_bulk_in_flight(&self) -> bool {
        self.bulk_in_flight
    }

    pub fn is_creating_task(&self) -> bool {
        self.creating_task
    }

    pub fn is_creating_project(&self) -> bool {
        self.creating_project
    }

    pub fn is_deleting_project(&self, project_id: ProjectId) -> bool {
        self.deleting_projects.contains(&project_id)
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    // ========================================================================
    // Derived Views
    // ========================================================================

    /// Incomplete tasks in the current collection.
    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_complete).count()
    }

    /// Selected project's name, or "All Tasks".
    pub fn header_title(&self) -> &str {
        self.selected_project
            .and_then(|id| self.projects.iter().find(|p| p.id == id))
            .map(|p| p.name.as_str())
            .unwrap_or(ALL_TASKS_TITLE)
    }

    /// Completion ratio of one project from the server aggregates.
    pub fn project_progress(&self, project_id: ProjectId) -> Option<f64> {
        self.projects
            .iter()
            .find(|p| p.id == project_id)
            .map(Project::progress)
    }

    /// Percentage of completed tasks across all projects, rounded.
    pub fn overall_progress(&self) -> u8 {
        let (total, completed) = self
            .projects
            .iter()
            .fold((0u64, 0u64), |(total, completed), p| {
                (
                    total + u64::from(p.task_count),
                    completed + u64::from(p.completed_count.min(p.task_count)),
                )
            });
        if total == 0 {
            return 0;
        }
        ((completed as f64 / total as f64) * 100.0).round() as u8
    }

    pub fn content_view(&self) -> ContentView {
        match self.load_state {
            LoadState::Idle | LoadState::Loading => ContentView::Loading,
            _ if self.projects.is_empty() => ContentView::NoProjects,
            _ if self.tasks.is_empty() => ContentView::Empty,
            _ => ContentView::Tasks,
        }
    }

    /// Whether `task` belongs in the collection under the current filter.
    pub(crate) fn matches_filter(&self, task: &Task) -> bool {
        self.selected_project
            .map_or(true, |project| task.project_id == project)
    }

    /// Drop selection and editor references to tasks no longer loaded.
    pub(crate) fn prune_to_loaded(&mut self) {
        let loaded: BTreeSet<TaskId> = self.tasks.iter().map(|t| t.id).collect();
        self.selection.retain(|id| loaded.contains(id));
        if self.editing_task.is_some_and(|id| !loaded.contains(&id)) {
            self.editing_task = None;
        }
    }
}

fn non_blank(value: &str, message: &'static str) -> Result<String, SyncError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SyncError::Validation(message));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// Tests
// ============================================================================
