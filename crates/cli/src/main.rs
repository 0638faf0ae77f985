// Quotabook CLI - commission statements from CRM exports

mod exit_codes;
mod fetch;
mod report;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use quotabook_engine::config::BookConfig;
use quotabook_engine::engine::{run, EngineInput};
use quotabook_engine::error::EngineError;
use quotabook_engine::loader::{load_churn, load_deals, Loaded};
use quotabook_engine::month::{available_months, MonthWindow};

use exit_codes::{EXIT_BOOK_CONFIG, EXIT_INPUT, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "qbook")]
#[command(about = "Monthly sales-commission attribution and reconciliation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a month's commission statement from CRM export files
    #[command(after_help = "\
Examples:
  qbook run --config book.toml --deals deals.json --churn churn.csv
  qbook run --config book.toml --deals deals.json --churn churn.csv --month 2026-02
  qbook run --config book.toml --deals deals.json --out statement.json --quiet
  qbook fetch deals --out deals.json && qbook run --config book.toml --deals deals.json")]
    Run {
        /// Book configuration TOML
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Report month (YYYY-MM; default: the month containing --as-of)
        #[arg(long)]
        month: Option<String>,

        /// Deal records JSON exported from the CRM
        #[arg(long)]
        deals: PathBuf,

        /// Churned-person CSV (omit when there is no churn export)
        #[arg(long)]
        churn: Option<PathBuf>,

        /// Treat this date as today (YYYY-MM-DD; default: the system clock)
        #[arg(long)]
        as_of: Option<String>,

        /// Output file for the statement JSON (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Suppress the stderr summary and notes
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Parse and validate a book configuration
    #[command(after_help = "\
Examples:
  qbook validate book.toml")]
    Validate {
        /// Book configuration TOML
        config: PathBuf,
    },

    /// List report months available for a book
    #[command(after_help = "\
Examples:
  qbook months --config book.toml
  qbook months --config book.toml --as-of 2026-02-15 --json")]
    Months {
        /// Book configuration TOML
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Treat this date as today (YYYY-MM-DD; default: the system clock)
        #[arg(long)]
        as_of: Option<String>,

        /// Emit a JSON array instead of one month key per line
        #[arg(long)]
        json: bool,
    },

    /// Pull deal and churn exports from the CRM
    Fetch {
        #[command(subcommand)]
        command: fetch::FetchCommands,
    },
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    config: PathBuf,
    month: Option<String>,
    deals_path: PathBuf,
    churn_path: Option<PathBuf>,
    as_of: Option<String>,
    out: Option<PathBuf>,
    quiet: bool,
) -> Result<(), CliError> {
    let book = load_book(&config)?;
    let as_of = resolve_as_of(as_of)?;
    let window = match month {
        Some(key) => MonthWindow::from_key(&key).map_err(CliError::from_engine)?,
        None => MonthWindow::containing(as_of),
    };
    if window.key() < book.book.origin_month {
        return Err(CliError::args(format!(
            "month {} predates the book origin {}",
            window.key(),
            book.book.origin_month,
        ))
        .with_hint("run `qbook months --config <book>` to list available months"));
    }

    let deals = load_deals(&deals_path, &book.attributes).map_err(CliError::from_engine)?;
    let churned = match &churn_path {
        Some(path) => load_churn(path, &book.churn_columns).map_err(CliError::from_engine)?,
        None => Loaded { records: Vec::new(), skipped: 0 },
    };
    let input = EngineInput {
        deals: deals.records,
        churned: churned.records,
        as_of,
    };

    let statement = run(&book, &window, &input).map_err(CliError::from_engine)?;

    let json = serde_json::to_string_pretty(&statement)
        .map_err(|e| CliError::io(format!("cannot serialize statement: {e}")))?;
    match &out {
        Some(path) => fs::write(path, json + "\n")
            .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?,
        None => println!("{json}"),
    }

    // warnings go to stderr even under --quiet; summary and notes do not
    if let Some(warning) = &statement.meta.warning {
        eprintln!("warning: {warning}");
    }
    if !quiet {
        if churn_path.is_none() {
            eprintln!("note: no churn file; reconciliation saw zero cancellations");
        }
        report::print_summary(&statement, deals.skipped, churned.skipped);
    }
    Ok(())
}

fn cmd_validate(config: PathBuf) -> Result<(), CliError> {
    let book = load_book(&config)?;
    println!(
        "{}: ok ({} reps, origin month {})",
        config.display(),
        book.reps.len(),
        book.book.origin_month,
    );
    Ok(())
}

fn cmd_months(config: PathBuf, as_of: Option<String>, json: bool) -> Result<(), CliError> {
    let book = load_book(&config)?;
    let as_of = resolve_as_of(as_of)?;
    let origin = MonthWindow::from_key(&book.book.origin_month).map_err(CliError::from_engine)?;
    let months = available_months(&origin, as_of);
    if json {
        let out = serde_json::to_string(&months)
            .map_err(|e| CliError::io(format!("cannot serialize months: {e}")))?;
        println!("{out}");
    } else {
        for month in &months {
            println!("{month}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn load_book(path: &Path) -> Result<BookConfig, CliError> {
    let data = fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", path.display())))?;
    BookConfig::from_toml(&data).map_err(CliError::from_engine)
}

fn resolve_as_of(flag: Option<String>) -> Result<NaiveDate, CliError> {
    match flag {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|e| CliError::args(format!("invalid --as-of date {raw:?}: {e}"))),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: qbook <command> [options]");
            eprintln!("       qbook --help for more information");
            Ok(())
        }
        Some(Commands::Run { config, month, deals, churn, as_of, out, quiet }) => {
            cmd_run(config, month, deals, churn, as_of, out, quiet)
        }
        Some(Commands::Validate { config }) => cmd_validate(config),
        Some(Commands::Months { config, as_of, json }) => cmd_months(config, as_of, json),
        Some(Commands::Fetch { command }) => fetch::cmd_fetch(command),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Map engine errors onto the exit-code registry.
    pub fn from_engine(err: EngineError) -> Self {
        let code = match &err {
            EngineError::ConfigParse(_)
            | EngineError::ConfigValidation(_)
            | EngineError::InvalidQuota { .. } => EXIT_BOOK_CONFIG,
            EngineError::MonthKey(_) => EXIT_USAGE,
            EngineError::MissingColumn { .. } | EngineError::RecordParse { .. } => EXIT_INPUT,
            EngineError::Io(_) => EXIT_IO,
        };
        let hint = match &err {
            EngineError::MonthKey(_) => Some("expected YYYY-MM, e.g. 2026-02".to_string()),
            EngineError::MissingColumn { .. } => {
                Some("set [churn_columns] in the book config to match the CSV headers".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_registry_codes() {
        let cases = [
            (EngineError::ConfigParse("x".into()), EXIT_BOOK_CONFIG),
            (EngineError::ConfigValidation("x".into()), EXIT_BOOK_CONFIG),
            (EngineError::InvalidQuota { rep: "r".into(), quota: -1 }, EXIT_BOOK_CONFIG),
            (EngineError::MonthKey("x".into()), EXIT_USAGE),
            (EngineError::MissingColumn { column: "x".into() }, EXIT_INPUT),
            (EngineError::RecordParse { path: "p".into(), msg: "m".into() }, EXIT_INPUT),
            (EngineError::Io("x".into()), EXIT_IO),
        ];
        for (err, code) in cases {
            assert_eq!(CliError::from_engine(err).code, code);
        }
    }

    #[test]
    fn month_key_errors_carry_a_hint() {
        let err = CliError::from_engine(EngineError::MonthKey("2026".into()));
        assert!(err.hint.as_deref().unwrap().contains("YYYY-MM"));
    }

    #[test]
    fn as_of_falls_back_to_the_clock() {
        let explicit = resolve_as_of(Some("2026-02-15".into())).unwrap();
        assert_eq!(explicit, NaiveDate::from_ymd_opt(2026, 2, 15).unwrap());
        assert!(resolve_as_of(Some("15/02/2026".into())).is_err());
        assert!(resolve_as_of(None).is_ok());
    }
}
