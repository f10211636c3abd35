//! Semantic color theme for consistent terminal output
//!
//! Centralized color constants with semantic meaning:
//! - `ACTIVE` => blue - headers, in-progress sessions
//! - `SUCCESS` => green - completed merges, clean worktrees
//! - `WARNING` => yellow - skipped targets, dirty worktrees
//! - `FAIL` => red - errors, failed sessions

use std::sync::LazyLock;

use owo_colors::Style;

/// Semantic color definitions for terminal output
pub struct SemanticColors {
    /// Blue - headers, in-progress sessions
    pub active: Style,
    /// Green - completed merges, clean worktrees
    pub success: Style,
    /// Yellow - skipped targets, dirty worktrees
    pub warning: Style,
    /// Red - errors, failed sessions
    pub fail: Style,
}

impl Default for SemanticColors {
    fn default() -> Self {
        Self {
            active: Style::new().blue(),
            success: Style::new().green(),
            warning: Style::new().yellow(),
            fail: Style::new().red(),
        }
    }
}

/// Global default theme
pub static COLORS: LazyLock<SemanticColors> = LazyLock::new(SemanticColors::default);

/// Style for a session status name
pub fn status_style(status: &str) -> Style {
    match status {
        "completed" => COLORS.success,
        "failed" => COLORS.fail,
        "pending" => COLORS.warning,
        _ => COLORS.active,
    }
}
