use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for CLI output
#[derive(Debug, Clone)]
pub struct Theme {
    /// Command banners and step titles
    pub header: Style,
    pub success: Style,
    /// Icons of info lines and steps
    pub info: Style,
    /// Labels
    pub dim: Style,
    /// Step numbers
    pub muted: Style,
    /// Generated DDL and SQL
    pub sql: Style,
}

impl Theme {
    /// Colored on a terminal unless colors are disabled (`NO_COLOR`, `CLICOLOR=0`)
    pub fn detect() -> Self {
        if console::colors_enabled() && console::Term::stdout().is_term() {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    pub fn colored() -> Self {
        Self {
            header: Style::new().cyan().bold(),
            success: Style::new().green().bold(),
            info: Style::new().magenta(),
            dim: Style::new().white().dimmed(),
            muted: Style::new().bright_black(),
            sql: Style::new().blue(),
        }
    }

    pub fn plain() -> Self {
        Self {
            header: Style::new(),
            success: Style::new(),
            info: Style::new(),
            dim: Style::new(),
            muted: Style::new(),
            sql: Style::new(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
