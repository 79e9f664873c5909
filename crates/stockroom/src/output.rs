//! Output formatting: table or JSON.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! JSON goes through serde.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use stockroom_core::SyncStatus;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Short sync badge for tables.
pub fn sync_badge(status: SyncStatus, color: bool) -> String {
    let label = match status {
        SyncStatus::Synced => "synced",
        SyncStatus::Unsynced => "unsynced",
        SyncStatus::PendingChanges => "pending",
    };
    if !color {
        return label.into();
    }
    match status {
        SyncStatus::Synced => label.green().to_string(),
        SyncStatus::Unsynced => label.dimmed().to_string(),
        SyncStatus::PendingChanges => label.yellow().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
    }
}

/// Render a single item. Table mode uses `detail_fn`'s pre-formatted text.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, Tabled)]
    struct Row {
        #[tabled(rename = "ID")]
        id: String,
    }

    #[test]
    fn json_list_is_an_array() {
        let rows = vec![Row { id: "b1".into() }];
        let out = render_list(OutputFormat::JsonCompact, &rows, |r| Row { id: r.id.clone() }).unwrap();
        assert_eq!(out, r#"[{"id":"b1"}]"#);
    }

    #[test]
    fn table_has_header() {
        let rows = vec![Row { id: "b1".into() }];
        let out = render_list(OutputFormat::Table, &rows, |r| Row { id: r.id.clone() }).unwrap();
        assert!(out.contains("ID"));
        assert!(out.contains("b1"));
    }

    #[test]
    fn plain_badges() {
        assert_eq!(sync_badge(SyncStatus::PendingChanges, false), "pending");
    }
}
