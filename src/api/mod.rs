//! Remote task store client.
//!
//! - [`types`] - Wire entities (projects, tasks) and request payloads
//! - [`client`] - One async method per entity/verb pair against the REST API
//!
//! Each call performs exactly one HTTP exchange. There is no retry, no caching
//! and no local state here; reconciliation lives in [`crate::app`].

mod client;
mod types;

pub use client::{ApiClient, ApiError};
pub use types::{
    NewProject, NewTask, Priority, Project, ProjectId, Task, TaskId, TaskUpdate,
    DEFAULT_PROJECT_COLOR,
};
