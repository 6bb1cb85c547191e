//! Output rendering for CLI surfaces.
//!
//! Command results go to stdout as JSON. Text listings and notices are for
//! humans and stay short.

use crate::core::error::CatalogError;
use serde::Serialize;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CatalogError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One listing row: bold id, name, dimmed detail.
pub fn render_row(id: &str, name: &str, detail: &str) -> String {
    use colored::Colorize;
    format!(
        "{}  {}  {}",
        id.bold(),
        compact_line(name, 40),
        compact_line(detail, 60).dimmed()
    )
}

/// Warning on stderr for a step that failed after the main write committed.
pub fn warn(message: &str) {
    use colored::Colorize;
    eprintln!("{} {}", "⚠".bright_yellow(), message);
}
