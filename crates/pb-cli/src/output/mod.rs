//! Output formatting utilities for the CLI
//!
//! Tables of registered tools and colored status lines.

use std::io::{self, Write};

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tabled::{settings::Style, Table, Tabled};

use pb_core::registry::ToolGroup;
use pb_core::types::Locality;

/// Format the tools of a group as an ASCII table
///
/// Returns "No tools registered" when the group has none.
pub fn format_group(group: &ToolGroup) -> String {
    if group.tools.is_empty() {
        return "No tools registered".to_string();
    }

    #[derive(Tabled)]
    struct ToolRow {
        #[tabled(rename = "TOOL")]
        tool: String,
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "LABEL")]
        label: String,
        #[tabled(rename = "OPTIONS")]
        options: String,
    }

    let rows: Vec<ToolRow> = group
        .tools
        .iter()
        .map(|t| {
            let (host, label) = match &t.locality {
                Locality::Local => ("local".to_string(), group.label.clone()),
                Locality::Remote { host, label } => (host.clone(), label.clone()),
            };
            ToolRow {
                tool: t.name.clone(),
                host,
                label: label.unwrap_or_else(|| "-".to_string()),
                options: if t.options.is_empty() {
                    "-".to_string()
                } else {
                    truncate(&t.options.join(" "), 48)
                },
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Truncate a string to a maximum length, adding ellipsis if needed
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn print_status(mut out: impl Write, color: Color, marker: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(marker),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_status(io::stdout(), Color::Green, "✓ ", msg);
}

/// Print an error message in red, to stderr
pub fn print_error(msg: &str) {
    print_status(io::stderr(), Color::Red, "✗ ", msg);
}

/// Print a warning message in yellow, to stderr
pub fn print_warning(msg: &str) {
    print_status(io::stderr(), Color::Yellow, "⚠ ", msg);
}

pub fn print_info(msg: &str) {
    print_status(io::stdout(), Color::Cyan, "ℹ ", msg);
}
