use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use meter_types::{CalendarDate, MonthKey, PeriodSelector, TypeError};

use crate::config::ViewMode;

#[derive(Parser)]
#[command(
    name = "meter",
    about = "Meter Ledger: utility meter readings and consumption",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (default: $METER_CONFIG, then ./meter.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Record a meter reading for today (or --date)
    Record(RecordArgs),
    /// Show the latest reading of a month
    Latest(LatestArgs),
    /// List the records of a period
    List(PeriodArgs),
    /// Monthly and annual consumption rollups
    Rollup(RollupArgs),
    /// Render the consumption report of a month
    Report(ReportArgs),
    /// Replace the reading or date of a record
    Edit(EditArgs),
    /// Delete a record
    Delete(DeleteArgs),
    /// Delete every record
    Clear(ClearArgs),
    /// Find records whose consumption figures are stale
    Audit(PeriodArgs),
    /// Rewrite the ledger log keeping only live records
    Compact,
    /// Interactive session: enter readings, watch the period update
    Watch(PeriodArgs),
    /// Show or change configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct RecordArgs {
    /// Cumulative meter reading
    #[arg(allow_negative_numbers = true)]
    pub reading: f64,
    /// Back-fill a specific day (dd/mm/yyyy or yyyy-mm-dd)
    #[arg(long)]
    pub date: Option<CalendarDate>,
}

#[derive(Args)]
pub struct LatestArgs {
    #[arg(long)]
    pub month: Option<u32>,
    #[arg(long)]
    pub year: Option<u32>,
}

/// Period selection shared by several commands.
#[derive(Args, Clone, Debug, Default)]
pub struct PeriodArgs {
    /// A single day (dd/mm/yyyy or yyyy-mm-dd)
    #[arg(long, conflicts_with_all = ["month", "year", "all"])]
    pub day: Option<CalendarDate>,
    /// Month number; the year defaults to the current one
    #[arg(long, conflicts_with = "all")]
    pub month: Option<u32>,
    #[arg(long, conflicts_with = "all")]
    pub year: Option<u32>,
    /// Every record
    #[arg(long)]
    pub all: bool,
}

impl PeriodArgs {
    /// The period named on the command line, if any.
    pub fn explicit(&self, today: CalendarDate) -> Result<Option<PeriodSelector>, TypeError> {
        if let Some(day) = self.day {
            return Ok(Some(PeriodSelector::Day(day)));
        }
        if self.all {
            return Ok(Some(PeriodSelector::All));
        }
        match (self.month, self.year) {
            (Some(month), year) => {
                let key = MonthKey::new(month, year.unwrap_or(today.year()))?;
                Ok(Some(PeriodSelector::Month(key)))
            }
            (None, Some(year)) => Ok(Some(PeriodSelector::Year(year))),
            (None, None) => Ok(None),
        }
    }

    /// The named period, else the one the view mode implies.
    pub fn resolve(&self, mode: ViewMode, today: CalendarDate) -> Result<PeriodSelector, TypeError> {
        Ok(self.explicit(today)?.unwrap_or_else(|| mode.selector(today)))
    }
}

#[derive(Args)]
pub struct RollupArgs {
    /// Restrict to one year
    #[arg(long)]
    pub year: Option<u32>,
}

#[derive(Args)]
pub struct ReportArgs {
    #[arg(long)]
    pub month: Option<u32>,
    #[arg(long)]
    pub year: Option<u32>,
    /// Render HTML instead of plain text
    #[arg(long)]
    pub html: bool,
}

#[derive(Args)]
pub struct EditArgs {
    /// Record ID or unique prefix
    pub id: String,
    #[arg(long, allow_negative_numbers = true)]
    pub reading: Option<f64>,
    #[arg(long)]
    pub date: Option<CalendarDate>,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Record ID or unique prefix
    pub id: String,
}

#[derive(Args)]
pub struct ClearArgs {
    /// Confirm deleting every record
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Add a report recipient
    AddRecipient { email: String },
    /// Remove a report recipient
    RemoveRecipient { email: String },
    /// Set the default period of `list` and `watch`
    ViewMode { mode: ViewMode },
}
