use std::sync::LazyLock;

use colored::Color;

/// CLI color theme configuration
pub struct ColorTheme {
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub highlight: Color,
    pub muted: Color,
    pub key: Color,
    pub value: Color,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            success: Color::Green,
            error: Color::Red,
            warning: Color::Yellow,
            highlight: Color::Cyan,
            muted: Color::BrightBlack,
            key: Color::BrightCyan,
            value: Color::White,
        }
    }
}

pub static THEME: LazyLock<ColorTheme> = LazyLock::new(ColorTheme::default);

pub struct Icons {
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub lock: &'static str,
}

pub const ICONS: Icons = Icons {
    success: "✓",
    error: "✗",
    warning: "⚠",
    lock: "🔒",
};
