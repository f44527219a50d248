/*!
 * Warden CLI - inspect and append to the audit ledger
 */

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use warden::{
    cli_style::{self, events_table, units_table},
    config::AppConfig,
    error::{Result, WardenError, EXIT_SUCCESS},
    ledger::{list_units, read_unit, verify_events, EventFilter, EventLedger},
    logging, Warden,
};

#[derive(Parser)]
#[command(name = "warden")]
#[command(version, about = "Tamper-evident audit ledger", long_about = None)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the ledger storage directory
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append an event to the ledger
    Log {
        /// Event type, e.g. DOCUMENT_PROCESSED
        event_type: String,

        /// Actor that caused the event (default: system)
        #[arg(long)]
        actor: Option<String>,

        /// Event payload as JSON
        #[arg(long, default_value = "{}")]
        data: String,
    },

    /// List events, newest first
    Events {
        #[command(flatten)]
        filter: FilterArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one event by id
    Show {
        id: String,
    },

    /// Verify the hash chain of the latest (or a given) persisted unit
    Verify {
        /// Unit file to verify instead of the latest one
        #[arg(long)]
        unit: Option<PathBuf>,
    },

    /// Export matching events, oldest first, as plaintext JSON
    Export {
        path: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// List persisted units
    Units,

    /// Write the effective configuration to a TOML file
    Init {
        path: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Only events of this type
    #[arg(long = "type")]
    event_type: Option<String>,

    /// Only events by this actor
    #[arg(long)]
    actor: Option<String>,

    /// Only events at or after this time (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    since: Option<DateTime<Utc>>,

    /// Only events at or before this time (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    until: Option<DateTime<Utc>>,

    /// Maximum number of events
    #[arg(long)]
    limit: Option<usize>,
}

impl FilterArgs {
    fn to_filter(&self) -> EventFilter {
        EventFilter {
            event_type: self.event_type.clone(),
            actor: self.actor.clone(),
            start_time: self.since,
            end_time: self.until,
            limit: self.limit,
        }
    }
}

fn parse_time(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", s, e))
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            cli_style::print_error(&e.to_string(), None);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(storage) = cli.storage {
        config.ledger.storage_path = storage;
    }
    if cli.verbose {
        config.logging.verbose = true;
    }
    logging::init_logging(&config.logging)?;

    if let Commands::Init { path } = &cli.command {
        config.to_file(path)?;
        cli_style::print_success(&format!("Wrote configuration to {}", path.display()));
        return Ok(());
    }

    let warden = Warden::open(config)?;
    let ledger = warden.ledger();

    let outcome = match cli.command {
        Commands::Log {
            event_type,
            actor,
            data,
        } => handle_log(ledger, &event_type, actor.as_deref(), &data),
        Commands::Events { filter, json } => handle_events(ledger, &filter.to_filter(), json),
        Commands::Show { id } => handle_show(ledger, &id),
        Commands::Verify { unit } => handle_verify(ledger, unit),
        Commands::Export { path, filter } => handle_export(ledger, &path, &filter.to_filter()),
        Commands::Units => handle_units(ledger),
        Commands::Init { .. } => Ok(()),
    };

    if !ledger.flush() {
        return Err(WardenError::Io(io::Error::other("failed to persist ledger")));
    }
    outcome
}

fn handle_log(ledger: &EventLedger, event_type: &str, actor: Option<&str>, data: &str) -> Result<()> {
    let payload: serde_json::Value = serde_json::from_str(data)?;
    let id = ledger.log_event(event_type, payload, actor);
    println!("{}", id);
    Ok(())
}

fn handle_events(ledger: &EventLedger, filter: &EventFilter, json: bool) -> Result<()> {
    let events = ledger.get_events(filter);
    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
    } else if events.is_empty() {
        cli_style::print_info("No matching events");
    } else {
        println!("{}", events_table(&events));
    }
    Ok(())
}

fn handle_show(ledger: &EventLedger, id: &str) -> Result<()> {
    let event = ledger
        .get_event_by_id(id)
        .ok_or_else(|| WardenError::NotFound(format!("event {}", id)))?;
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}

fn handle_verify(ledger: &EventLedger, unit: Option<PathBuf>) -> Result<()> {
    let unit = match unit {
        Some(path) => Some(path),
        None => list_units(ledger.storage_path())?.pop(),
    };

    let (source, events) = match unit {
        Some(path) => {
            let events = read_unit(&path, ledger.cipher())?;
            (path.display().to_string(), events)
        }
        None => {
            cli_style::print_warning("No persisted units; verifying the in-memory ledger");
            ("in-memory ledger".to_string(), ledger.events())
        }
    };

    let report = verify_events(&events);
    cli_style::print_report(&source, &report);

    match report.first_broken_index {
        Some(index) => Err(WardenError::Integrity {
            index,
            message: report.message,
        }),
        None => Ok(()),
    }
}

fn handle_export(ledger: &EventLedger, path: &std::path::Path, filter: &EventFilter) -> Result<()> {
    if !ledger.export_events(path, filter) {
        return Err(WardenError::Io(io::Error::other(format!(
            "failed to export events to {}",
            path.display()
        ))));
    }
    cli_style::print_success(&format!("Exported events to {}", path.display()));
    Ok(())
}

fn handle_units(ledger: &EventLedger) -> Result<()> {
    let units = list_units(ledger.storage_path())?;
    if units.is_empty() {
        cli_style::print_info("No persisted units");
        return Ok(());
    }

    let rows: Vec<(String, std::result::Result<usize, String>, u64)> = units
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let events = read_unit(path, ledger.cipher())
                .map(|events| events.len())
                .map_err(|e| e.to_string());
            let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            (name, events, bytes)
        })
        .collect();

    println!("{}", units_table(&rows));
    Ok(())
}
