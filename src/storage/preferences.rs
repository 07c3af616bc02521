use anyhow::Result;

use super::schema::Database;

impl Database {
    // ========================================================================
    // User Preferences Operations
    // ========================================================================

    /// Get a single preference value by key.
    ///
    /// Keys use dotted convention: `theme.mode`, `profile.name`, `widgets.layout`, etc.
    ///
    /// # Returns
    ///
    /// The preference value if the key exists, or `None` if not set.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT).
    ///
    /// Inserts the key-value pair if it doesn't exist, or updates the value and
    /// timestamp if the key already exists.
    ///
    /// # Arguments
    ///
    /// * `key` - Dotted preference key (e.g., `theme.mode`)
    /// * `value` - The preference value to store
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a preference. Removing a missing key is not an error.
    ///
    /// # Returns
    ///
    /// `true` if a row was deleted.
    pub async fn delete_preference(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_preferences WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get all preferences matching a key prefix.
    ///
    /// An empty prefix returns every stored preference (used at startup).
    ///
    /// # Arguments
    ///
    /// * `prefix` - The key prefix to match (e.g., `theme.` returns `theme.mode`, `theme.accent`)
    ///
    /// # Returns
    ///
    /// A vector of (key, value) pairs matching the prefix, ordered by key.
    pub async fn get_preferences_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        // Escape LIKE wildcards so `profile_` can't match `profileX`
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("{}%", escaped);
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM user_preferences WHERE key LIKE ? ESCAPE '\\' ORDER BY key",
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
