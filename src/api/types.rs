use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Color assigned to projects created without an explicit color.
pub const DEFAULT_PROJECT_COLOR: &str = "#6b7280";

// ============================================================================
// Identifiers
// ============================================================================

/// Server-assigned project identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

/// Server-assigned task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Priority
// ============================================================================

/// Task priority. Serialized as the integers 1 (Low), 2 (Medium), 3 (High).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(format!("unknown priority {}", other)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A project as returned by the server, including its task aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default = "default_project_color")]
    pub color: String,
    #[serde(default)]
    pub task_count: u32,
    #[serde(default)]
    pub completed_count: u32,
}

impl Project {
    /// Completion ratio in `[0.0, 1.0]` from the server aggregates.
    ///
    /// Returns 0.0 for a project without tasks.
    pub fn progress(&self) -> f64 {
        if self.task_count == 0 {
            return 0.0;
        }
        f64::from(self.completed_count.min(self.task_count)) / f64::from(self.task_count)
    }
}

fn default_project_color() -> String {
    DEFAULT_PROJECT_COLOR.to_string()
}

/// A task in its canonical (server-returned) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub project_id: ProjectId,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_complete: bool,
}

impl Task {
    /// Whether the task is incomplete with a due date strictly before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_complete && self.due_date.is_some_and(|due| due < today)
    }
}

// ============================================================================
// Request Payloads
// ============================================================================

/// Body of `POST /projects/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProject {
    pub name: String,
    pub color: String,
}

impl NewProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: DEFAULT_PROJECT_COLOR.to_string(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

/// Body of `POST /tasks/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    pub project_id: ProjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, project_id: ProjectId) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: Priority::default(),
            project_id,
            due_date: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn due(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }
}

/// Body of `PUT /tasks/{id}`: only the fields being changed.
///
/// `due_date: Some(None)` serializes as an explicit `null`, clearing the date.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
}

impl TaskUpdate {
    /// Update that only sets the completion flag.
    pub fn completion(is_complete: bool) -> Self {
        Self {
            is_complete: Some(is_complete),
            ..Self::default()
        }
    }

    /// Diff two versions of a task, keeping only the fields that changed.
    pub fn between(before: &Task, after: &Task) -> Self {
        fn changed<T: PartialEq + Clone>(old: &T, new: &T) -> Option<T> {
            (old != new).then(|| new.clone())
        }

        Self {
            title: changed(&before.title, &after.title),
            description: if before.description != after.description {
                Some(after.description.clone().unwrap_or_default())
            } else {
                None
            },
            priority: changed(&before.priority, &after.priority),
            project_id: changed(&before.project_id, &after.project_id),
            due_date: changed(&before.due_date, &after.due_date),
            is_complete: changed(&before.is_complete, &after.is_complete),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.project_id.is_none()
            && self.due_date.is_none()
            && self.is_complete.is_none()
    }
}
