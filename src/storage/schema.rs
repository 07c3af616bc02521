use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Why the preference database could not be opened.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLite reported the file busy: another taskdeck holds it.
    #[error("Another taskdeck instance is using the preference database. Close it and try again.")]
    InstanceLocked,

    #[error("Failed to create preference schema: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            DatabaseError::InstanceLocked
        } else {
            DatabaseError::Other(err)
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), in any of the forms sqlx renders them.
fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    ["database is locked", "database table is locked", "sqlite_busy", "sqlite_locked"]
        .iter()
        .any(|needle| message.contains(needle))
}

// ============================================================================
// Database
// ============================================================================

/// Local SQLite database holding user preferences.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the preference database and run migrations.
    ///
    /// Pass `":memory:"` for a throwaway database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another taskdeck process
    /// holds the database lock, `DatabaseError::Migration` if the schema
    /// cannot be created, and `DatabaseError::Other` for anything else.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        // Pre-create the file user-only so it never exists with umask permissions
        #[cfg(unix)]
        if !in_memory {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if db_path.parent().is_some_and(|p| p.exists()) {
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok(); // If creation fails, SQLite reports the error at connect_with.
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");

        // Every in-memory connection is its own database, so pin the pool to one.
        let max_connections = if in_memory { 1 } else { 2 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            let message = e.to_string();
            if is_lock_message(&message) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(message)
            }
        })?;
        Ok(db)
    }

    /// Create the schema. Idempotent: every statement uses `IF NOT EXISTS`.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Keys use dotted convention: theme.mode, profile.name, widgets.layout, etc.
        // Values are JSON text.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
