//! Colours and glyphs for status lines.

use console::Style;

use super::Tone;

/// Renders status lines, with or without ANSI colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    colored: bool,
}

impl Palette {
    /// Colour when stderr is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        Self {
            colored: colors_enabled(),
        }
    }

    pub fn colored() -> Self {
        Self { colored: true }
    }

    pub fn plain() -> Self {
        Self { colored: false }
    }

    pub fn paint(&self, tone: Tone, text: &str) -> String {
        let line = match glyph(tone) {
            Some(glyph) => format!("{glyph} {text}"),
            None => text.to_string(),
        };
        if !self.colored {
            return line;
        }
        style(tone).force_styling(true).apply_to(line).to_string()
    }
}

fn glyph(tone: Tone) -> Option<&'static str> {
    match tone {
        Tone::Plain => None,
        Tone::Good => Some("✓"),
        Tone::Caution => Some("⚠"),
        Tone::Failure => Some("✗"),
        Tone::Banner => Some("📅"),
    }
}

fn style(tone: Tone) -> Style {
    match tone {
        Tone::Plain => Style::new(),
        Tone::Good => Style::new().green(),
        Tone::Caution => Style::new().yellow(),
        Tone::Failure => Style::new().red().bold(),
        Tone::Banner => Style::new().cyan().bold(),
    }
}

/// https://no-color.org/
pub fn colors_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none() && console::Term::stderr().is_term()
}
