use std::fmt::Display;

use console::style;

/// Styled terminal messages for command handlers
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Indented `Label: value` line with labels padded to one width
    pub fn field(&self, label: &str, value: impl Display) {
        println!("{}", format_field(label, value));
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

const LABEL_WIDTH: usize = 12;

fn format_field(label: &str, value: impl Display) -> String {
    format!("  {:<width$}{}", format!("{}:", label), value, width = LABEL_WIDTH)
}
