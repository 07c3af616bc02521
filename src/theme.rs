//! Theme mode and design tokens.
//!
//! A `ThemeMode` plus an accent color derive a complete `DesignTokens` set:
//! surface and text colors come from the mode, tints come from the accent.
//! Presentation layers read tokens; nothing here knows about rendering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Accent used when none is stored or the stored one is not a hex color.
pub const DEFAULT_ACCENT: &str = "#8A72FF";

/// Accent swatches offered in settings.
pub const ACCENT_PRESETS: [&str; 5] = ["#8A72FF", "#3b82f6", "#22c55e", "#ef4444", "#f97316"];

// ============================================================================
// Theme Mode
// ============================================================================

/// Light or dark surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    #[default]
    Dark,
}

impl ThemeMode {
    /// Parse a mode name (case-insensitive).
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }

    /// The other mode.
    pub fn toggle(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Colors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Parse `#RRGGBB` or `#RGB` (leading `#` optional).
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize, width: usize| u8::from_str_radix(&hex[i..i + width], 16).ok();
        match hex.len() {
            6 => Some(Self {
                r: channel(0, 2)?,
                g: channel(2, 2)?,
                b: channel(4, 2)?,
            }),
            3 => {
                // #abc == #aabbcc
                let expand = |v: u8| v * 17;
                Some(Self {
                    r: expand(channel(0, 1)?),
                    g: expand(channel(1, 1)?),
                    b: expand(channel(2, 1)?),
                })
            }
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// CSS-style `rgba(r, g, b, a)` with the alpha trimmed of trailing zeros.
    pub fn with_alpha(self, alpha: f32) -> String {
        let alpha = alpha.clamp(0.0, 1.0);
        let formatted = format!("{:.2}", alpha);
        let formatted = formatted.trim_end_matches('0').trim_end_matches('.');
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, formatted)
    }
}

/// Whether `s` is a usable accent color.
pub fn is_valid_accent(s: &str) -> bool {
    Rgb::parse_hex(s).is_some()
}

// ============================================================================
// Design Tokens
// ============================================================================

/// Concrete color values for one mode/accent combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignTokens {
    pub mode: ThemeMode,
    pub background: String,
    pub paper: String,
    pub text_primary: String,
    pub text_secondary: String,
    pub divider: String,
    pub accent: String,
    /// Background of a selected list row.
    pub accent_selected: String,
    /// Background of a hovered selected list row.
    pub accent_selected_hover: String,
    /// Background of a hovered list row.
    pub accent_hover: String,
    /// Top stop of the page background gradient.
    pub backdrop: String,
}

impl DesignTokens {
    /// Derive tokens from a mode and accent. An unparsable accent falls back to
    /// [`DEFAULT_ACCENT`].
    pub fn derive(mode: ThemeMode, accent: &str) -> Self {
        let accent_rgb = Rgb::parse_hex(accent)
            .or_else(|| {
                tracing::debug!(accent = %accent, "Invalid accent color, using default");
                Rgb::parse_hex(DEFAULT_ACCENT)
            })
            .unwrap_or_default();
        let accent_hex = accent_rgb.to_hex();

        let (background, paper, text_primary, text_secondary, divider, backdrop_alpha) = match mode
        {
            ThemeMode::Light => (
                "#f9fafb",
                "#ffffff",
                "#1f2937",
                "#6b7280",
                "rgba(0, 0, 0, 0.07)",
                0.05,
            ),
            ThemeMode::Dark => (
                "#0d0d0f",
                "#18181a",
                "#f4f4f5",
                "#a0a0a9",
                "rgba(255, 255, 255, 0.1)",
                0.1,
            ),
        };

        Self {
            mode,
            background: background.to_string(),
            paper: paper.to_string(),
            text_primary: text_primary.to_string(),
            text_secondary: text_secondary.to_string(),
            divider: divider.to_string(),
            accent: accent_hex,
            accent_selected: accent_rgb.with_alpha(0.10),
            accent_selected_hover: accent_rgb.with_alpha(0.15),
            accent_hover: accent_rgb.with_alpha(0.05),
            backdrop: accent_rgb.with_alpha(backdrop_alpha),
        }
    }
}
