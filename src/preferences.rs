//! Preference store that merges config.toml defaults with DB overrides.
//!
//! Values are JSON text. Config values serve as defaults; DB values
//! (user_preferences table) override them. Writes always go to the DB, never
//! to the config file. A stored value that no longer decodes is treated as
//! absent and the typed default is returned instead.
use std::collections::HashMap;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::storage::Database;
use crate::theme::{is_valid_accent, DesignTokens, ThemeMode, DEFAULT_ACCENT};
use crate::widgets::{WidgetKind, WidgetLayout, WidgetSlot};

/// Preference keys (dotted convention).
pub mod keys {
    pub const THEME_MODE: &str = "theme.mode";
    pub const THEME_ACCENT: &str = "theme.accent";
    pub const PROFILE_NAME: &str = "profile.name";
    pub const PROFILE_AVATAR: &str = "profile.avatar";
    pub const QUICK_NOTES: &str = "notes.quick";
    pub const WIDGET_LAYOUT: &str = "widgets.layout";
    pub const ONBOARDING_COMPLETE: &str = "onboarding.complete";
    pub const WEATHER_CITY: &str = "weather.city";
}

/// Display name used until the user sets one.
pub const DEFAULT_PROFILE_NAME: &str = "User";

#[derive(Debug, Error)]
enum PreferenceError {
    #[error("Stored preference {key} is not valid: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// PreferenceStore
// ============================================================================

/// Merged preference store: config.toml defaults + DB overrides.
///
/// Reads are served from memory. Writes persist to the DB first and update the
/// in-memory map only once the write succeeded.
pub struct PreferenceStore {
    db: Option<Database>,
    prefs: HashMap<String, String>,
}

impl PreferenceStore {
    /// Load preferences by merging config defaults with every stored row.
    pub async fn load(config: &Config, db: Database) -> Result<Self> {
        let mut prefs = Self::flatten_config(config);

        for (key, value) in db.get_preferences_by_prefix("").await? {
            prefs.insert(key, value);
        }
        tracing::debug!(count = prefs.len(), "Loaded preferences");

        Ok(Self {
            db: Some(db),
            prefs,
        })
    }

    /// Create from config only (no DB). Fallback for when the DB cannot be
    /// opened; writes then only last for this session.
    pub fn from_config(config: &Config) -> Self {
        Self {
            db: None,
            prefs: Self::flatten_config(config),
        }
    }

    /// Raw JSON text of a preference.
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.prefs.get(key).map(String::as_str)
    }

    /// Decode a preference, falling back to `default` when absent or corrupt.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.decode(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ignoring corrupt preference, using default");
                default
            }
        }
    }

    /// Encode and persist a preference.
    pub async fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        if let Some(db) = &self.db {
            db.set_preference(key, &json).await?;
        }
        self.prefs.insert(key.to_string(), json);
        Ok(())
    }

    /// Remove a stored preference so its default applies again.
    pub async fn remove(&mut self, key: &str) -> Result<()> {
        if let Some(db) = &self.db {
            db.delete_preference(key).await?;
        }
        self.prefs.remove(key);
        Ok(())
    }

    // ========================================================================
    // Theme
    // ========================================================================

    pub fn theme_mode(&self) -> ThemeMode {
        self.get_or(keys::THEME_MODE, ThemeMode::default())
    }

    pub async fn set_theme_mode(&mut self, mode: ThemeMode) -> Result<()> {
        self.set(keys::THEME_MODE, &mode).await
    }

    /// Switch between light and dark. Returns the new mode.
    pub async fn toggle_theme_mode(&mut self) -> Result<ThemeMode> {
        let mode = self.theme_mode().toggle();
        self.set_theme_mode(mode).await?;
        Ok(mode)
    }

    /// Stored accent, or the default accent if the stored one is unusable.
    pub fn accent_color(&self) -> String {
        let accent: String = self.get_or(keys::THEME_ACCENT, DEFAULT_ACCENT.to_string());
        if is_valid_accent(&accent) {
            accent
        } else {
            DEFAULT_ACCENT.to_string()
        }
    }

    pub async fn set_accent_color(&mut self, accent: &str) -> Result<()> {
        if !is_valid_accent(accent) {
            anyhow::bail!("Invalid accent color: {}", accent);
        }
        self.set(keys::THEME_ACCENT, accent).await
    }

    pub fn design_tokens(&self) -> DesignTokens {
        DesignTokens::derive(self.theme_mode(), &self.accent_color())
    }

    // ========================================================================
    // Profile
    // ========================================================================

    pub fn profile_name(&self) -> String {
        self.get_or(keys::PROFILE_NAME, DEFAULT_PROFILE_NAME.to_string())
    }

    /// Set the display name. A blank name restores the default.
    pub async fn set_profile_name(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return self.remove(keys::PROFILE_NAME).await;
        }
        self.set(keys::PROFILE_NAME, name).await
    }

    /// Avatar image data (typically a data URL).
    pub fn profile_avatar(&self) -> Option<String> {
        self.get_or(keys::PROFILE_AVATAR, None)
    }

    pub async fn set_profile_avatar(&mut self, data: &str) -> Result<()> {
        self.set(keys::PROFILE_AVATAR, data).await
    }

    pub async fn clear_profile_avatar(&mut self) -> Result<()> {
        self.remove(keys::PROFILE_AVATAR).await
    }

    // ========================================================================
    // Quick Notes
    // ========================================================================

    pub fn quick_notes(&self) -> Vec<String> {
        self.get_or(keys::QUICK_NOTES, Vec::new())
    }

    /// Append a note. Blank notes are ignored; returns whether one was added.
    pub async fn add_quick_note(&mut self, note: &str) -> Result<bool> {
        let note = note.trim();
        if note.is_empty() {
            return Ok(false);
        }
        let mut notes = self.quick_notes();
        notes.push(note.to_string());
        self.set(keys::QUICK_NOTES, &notes).await?;
        Ok(true)
    }

    /// Remove the note at `index`. Returns the removed note, if any.
    pub async fn remove_quick_note(&mut self, index: usize) -> Result<Option<String>> {
        let mut notes = self.quick_notes();
        if index >= notes.len() {
            return Ok(None);
        }
        let removed = notes.remove(index);
        self.set(keys::QUICK_NOTES, &notes).await?;
        Ok(Some(removed))
    }

    // ========================================================================
    // Widgets
    // ========================================================================

    pub fn widget_layout(&self) -> WidgetLayout {
        let slots: Option<Vec<WidgetSlot>> = self.get_or(keys::WIDGET_LAYOUT, None);
        slots.map(WidgetLayout::from_slots).unwrap_or_default()
    }

    pub async fn set_widget_layout(&mut self, layout: &WidgetLayout) -> Result<()> {
        self.set(keys::WIDGET_LAYOUT, layout).await
    }

    /// Flip one widget's visibility. Returns the new visibility.
    pub async fn toggle_widget(&mut self, kind: WidgetKind) -> Result<bool> {
        let mut layout = self.widget_layout();
        let visible = layout.toggle(kind);
        self.set_widget_layout(&layout).await?;
        Ok(visible)
    }

    /// Move a widget from one position to another. Out-of-range indices are a
    /// no-op and nothing is written.
    pub async fn reorder_widgets(&mut self, from: usize, to: usize) -> Result<bool> {
        let mut layout = self.widget_layout();
        if !layout.reorder(from, to) {
            return Ok(false);
        }
        self.set_widget_layout(&layout).await?;
        Ok(true)
    }

    // ========================================================================
    // Misc
    // ========================================================================

    pub fn onboarding_complete(&self) -> bool {
        self.get_or(keys::ONBOARDING_COMPLETE, false)
    }

    pub async fn complete_onboarding(&mut self) -> Result<()> {
        self.set(keys::ONBOARDING_COMPLETE, &true).await
    }

    /// Last city the weather widget looked up.
    pub fn weather_city(&self) -> Option<String> {
        self.get_or(keys::WEATHER_CITY, None)
    }

    pub async fn set_weather_city(&mut self, city: &str) -> Result<()> {
        let city = city.trim();
        if city.is_empty() {
            return self.remove(keys::WEATHER_CITY).await;
        }
        self.set(keys::WEATHER_CITY, city).await
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PreferenceError> {
        let Some(raw) = self.prefs.get(key) else {
            return Ok(None);
        };
        serde_json::from_str(raw)
            .map(Some)
            .map_err(|source| PreferenceError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    /// Config values that act as defaults beneath stored preferences.
    fn flatten_config(config: &Config) -> HashMap<String, String> {
        let mut map = HashMap::new();

        match ThemeMode::from_str_name(&config.theme) {
            Some(mode) => {
                if let Ok(json) = serde_json::to_string(&mode) {
                    map.insert(keys::THEME_MODE.to_string(), json);
                }
            }
            None => {
                tracing::warn!(theme = %config.theme, "Unknown theme in config, using dark");
            }
        }

        if is_valid_accent(&config.accent_color) {
            if let Ok(json) = serde_json::to_string(&config.accent_color) {
                map.insert(keys::THEME_ACCENT.to_string(), json);
            }
        } else {
            tracing::warn!(accent = %config.accent_color, "Invalid accent_color in config, using default");
        }

        map
    }
}

// ============================================================================
// Tests
// ============================================================================
