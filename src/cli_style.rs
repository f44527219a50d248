/*!
 * CLI output styling: themed messages and tables for ledger inspection
 */

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};
use warden_core_ledger::{IntegrityReport, LedgerEvent};

/// Colors for consistent styling
pub struct Theme;

impl Theme {
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }
}

/// Status icons
pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const INFO: &'static str = "ℹ";
}

/// Create a styled data table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(cells: &[&str]) -> Vec<Cell> {
    cells
        .iter()
        .map(|text| Cell::new(text).fg(Color::Cyan).add_attribute(Attribute::Bold))
        .collect()
}

/// First `len` characters of a hash, for compact display
pub fn short_hash(hash: &str, len: usize) -> &str {
    match hash.char_indices().nth(len) {
        Some((end, _)) => &hash[..end],
        None => hash,
    }
}

/// Events as a table, in the order given
pub fn events_table(events: &[LedgerEvent]) -> Table {
    let mut table = create_table();
    table.set_header(header(&["Timestamp", "Type", "Actor", "Id", "Hash"]));

    for event in events {
        table.add_row(vec![
            Cell::new(event.timestamp.format("%Y-%m-%d %H:%M:%S%.6f")),
            Cell::new(&event.event_type).fg(Color::White).add_attribute(Attribute::Bold),
            Cell::new(&event.actor),
            Cell::new(&event.id).fg(Color::DarkGrey),
            Cell::new(short_hash(&event.hash, 12)).fg(Color::DarkGrey),
        ]);
    }

    table
}

/// One row per persisted unit: name, event count (or error), size
pub fn units_table(rows: &[(String, Result<usize, String>, u64)]) -> Table {
    let mut table = create_table();
    table.set_header(header(&["Unit", "Events", "Bytes"]));

    for (name, events, bytes) in rows {
        let events = match events {
            Ok(count) => Cell::new(count),
            Err(reason) => Cell::new(format!("{} {}", Icons::ERROR, reason)).fg(Color::Red),
        };
        table.add_row(vec![Cell::new(name), events, Cell::new(bytes)]);
    }

    table
}

/// Print a verification report
pub fn print_report(source: &str, report: &IntegrityReport) {
    if report.verified {
        print_success(&format!("{}: {}", source, report.message));
    } else {
        print_error(
            &format!("{}: {}", source, report.message),
            Some("events from the broken position onward cannot be trusted"),
        );
    }
}

/// Print a styled error message with an optional hint
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!("{} {}", Theme::error(format!("{} Error:", Icons::ERROR)), message);

    if let Some(hint) = suggestion {
        eprintln!("  {}", Theme::muted(hint));
    }
}

pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

pub fn print_info(message: &str) {
    println!("{} {}", Theme::primary(Icons::INFO.to_string()), message);
}
