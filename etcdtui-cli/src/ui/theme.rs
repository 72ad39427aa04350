//! Colour palette and style helpers
//!
//! Palette tokens instead of hard-coded colours, with a dark default and a
//! high-contrast variant selected at startup.

use ratatui::style::{Color, Modifier, Style};

use etcdtui_core::debug_log::LogLevel;
use etcdtui_core::live::WatchLineKind;

#[derive(Clone, Debug)]
pub struct Palette {
    /// Panel border color
    pub panel_border: Color,
    /// Primary text color
    pub text: Color,
    /// Dimmed text (secondary info)
    pub text_dim: Color,
    /// Muted text (tertiary info, disabled)
    pub text_muted: Color,
    /// Accent color (highlights, focus)
    pub accent: Color,
    /// Directory nodes in the tree
    pub directory: Color,
    pub success: Color,
    pub warn: Color,
    pub error: Color,
    pub info: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    /// VS Code-esque dark theme
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255), // Light blue
            directory: Color::Rgb(220, 220, 170),
            success: Color::Rgb(78, 201, 176), // Teal green
            warn: Color::Rgb(220, 180, 100),   // Amber
            error: Color::Rgb(244, 135, 113),  // Coral red
            info: Color::Rgb(156, 220, 254),   // Light cyan
            selection_bg: Color::Rgb(38, 79, 120),
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120), // Soft orange
        }
    }

    pub fn high_contrast() -> Self {
        Self {
            panel_border: Color::White,
            text: Color::White,
            text_dim: Color::Rgb(200, 200, 200),
            text_muted: Color::Rgb(150, 150, 150),
            accent: Color::Cyan,
            directory: Color::Yellow,
            success: Color::Green,
            warn: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            selection_bg: Color::Blue,
            selection_fg: Color::White,
            key_hint: Color::Yellow,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    pub fn level_style(&self, level: LogLevel) -> Style {
        let color = match level {
            LogLevel::Debug => self.palette.text_muted,
            LogLevel::Info => self.palette.success,
            LogLevel::Warn => self.palette.warn,
            LogLevel::Error => self.palette.error,
        };
        Style::default().fg(color)
    }

    pub fn watch_line_style(&self, kind: WatchLineKind) -> Style {
        match kind {
            WatchLineKind::Info => Style::default().fg(self.palette.text_dim),
            WatchLineKind::Value => Style::default().fg(self.palette.text),
            WatchLineKind::Put => Style::default()
                .fg(self.palette.success)
                .add_modifier(Modifier::BOLD),
            WatchLineKind::Delete => Style::default()
                .fg(self.palette.error)
                .add_modifier(Modifier::BOLD),
            WatchLineKind::Error => Style::default().fg(self.palette.error),
        }
    }

    pub fn border_style(&self, focused: bool) -> Style {
        if focused {
            Style::default().fg(self.palette.accent)
        } else {
            Style::default().fg(self.palette.panel_border)
        }
    }

    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn directory_style(&self) -> Style {
        Style::default()
            .fg(self.palette.directory)
            .add_modifier(Modifier::BOLD)
    }

    pub fn section_header_style(&self) -> Style {
        Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD)
    }
}

static THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

/// Pick the palette. Only the first call has an effect.
pub fn init(high_contrast: bool) {
    let palette = if high_contrast {
        Palette::high_contrast()
    } else {
        Palette::dark()
    };
    let _ = THEME.set(Theme::new(palette));
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::default)
}

/// Convenience accessors for the active theme
pub mod styles {
    use super::*;

    pub fn level(level: LogLevel) -> Style {
        theme().level_style(level)
    }

    pub fn watch_line(kind: WatchLineKind) -> Style {
        theme().watch_line_style(kind)
    }

    pub fn border(focused: bool) -> Style {
        theme().border_style(focused)
    }

    pub fn border_focused() -> Style {
        theme().border_style(true)
    }

    pub fn selection() -> Style {
        theme().selection_style()
    }

    pub fn directory() -> Style {
        theme().directory_style()
    }

    pub fn section_header() -> Style {
        theme().section_header_style()
    }

    pub fn key_hint() -> Style {
        Style::default().fg(theme().palette.key_hint)
    }

    pub fn text() -> Style {
        Style::default().fg(theme().palette.text)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(theme().palette.text_dim)
    }

    pub fn text_muted() -> Style {
        Style::default().fg(theme().palette.text_muted)
    }

    pub fn accent() -> Style {
        Style::default().fg(theme().palette.accent)
    }

    pub fn success() -> Style {
        Style::default().fg(theme().palette.success)
    }

    pub fn warn() -> Style {
        Style::default().fg(theme().palette.warn)
    }

    pub fn error() -> Style {
        Style::default().fg(theme().palette.error)
    }

    pub fn info() -> Style {
        Style::default().fg(theme().palette.info)
    }
}
