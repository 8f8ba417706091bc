//! Human/JSON output switching shared by every subcommand.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

const SPINNER_TEMPLATE: &str = "{spinner} {msg} [{elapsed}]";

#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
    quiet: bool,
}

impl Output {
    pub fn new(json: bool, quiet: bool) -> Self {
        Self { json, quiet }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Print a line on stdout unless in JSON or quiet mode.
    pub fn info(&self, line: impl AsRef<str>) {
        if !self.json && !self.quiet {
            println!("{}", line.as_ref());
        }
    }

    /// Print a value as pretty JSON on stdout.
    pub fn print_json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("  Error: could not serialize output: {e}"),
        }
    }

    /// Spinner on stderr for long-running steps; hidden in JSON or quiet mode.
    pub fn spinner(&self, message: impl Into<String>) -> ProgressBar {
        if self.json || self.quiet {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
            pb.set_style(style.tick_strings(&[".  ", ".. ", "...", " ..", "  .", "   "]));
        }
        pb.set_message(message.into());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }
}

/// Shorten a long URL for terminal display.
pub fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let head: String = text.chars().take(keep).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ellipsize_keeps_short_text() {
        assert_eq!(ellipsize("https://a.b/c", 40), "https://a.b/c");
    }

    #[test]
    fn test_ellipsize_truncates_long_text() {
        let long = "x".repeat(50);
        let short = ellipsize(&long, 10);
        assert_eq!(short, "xxxxxxx...");
        assert_eq!(short.chars().count(), 10);
    }

    #[test]
    fn test_spinner_hidden_in_json_mode() {
        assert!(Output::new(true, false).spinner("working").is_hidden());
        assert!(Output::new(false, true).spinner("working").is_hidden());
    }
}
