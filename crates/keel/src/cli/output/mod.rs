//! Output formatting utilities

use console::{style, Style, StyledObject};

use keel_core::Verdict;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().underlined().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: impl std::fmt::Display) -> String {
    format!("  {:<14} {}", style(format!("{}:", key)).dim(), value)
}

/// Style for tags
pub fn tag_style() -> Style {
    Style::new().yellow()
}

/// Style for paths
pub fn path_style() -> Style {
    Style::new().cyan()
}

/// A verdict, colored by severity
pub fn verdict(verdict: Verdict) -> StyledObject<&'static str> {
    let styled = style(verdict.as_str()).bold();
    match verdict {
        Verdict::Breaking => styled.red(),
        Verdict::MaybeNotBreaking => styled.green(),
        Verdict::Withheld => styled.yellow(),
    }
}
