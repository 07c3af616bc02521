//! taskdeck: a task and project dashboard client.
//!
//! - [`api`] - Typed REST client for the remote task store
//! - [`app`] - [`Dashboard`] state, intents and derived views
//! - [`bulk`] - Set-valued operations over selected tasks
//! - [`preferences`] - Local preference store (theme, profile, notes, widgets)
//!
//! Remote calls run as spawned tokio tasks and report back as [`SyncEvent`]s;
//! the owner of the receiver feeds them to [`Dashboard::handle_event`].

pub mod api;
pub mod app;
mod background;
pub mod bulk;
pub mod config;
mod events;
pub mod preferences;
pub mod storage;
pub mod theme;
pub mod widgets;

pub use app::{ContentView, Dashboard, LoadState, Notice, Severity, SyncError, SyncEvent};
pub use background::BackgroundTask;
pub use config::{Config, ConfigError};
pub use preferences::PreferenceStore;
