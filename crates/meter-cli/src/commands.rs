use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use meter_ledger::{
    AuditReport, Clock, ConsumptionCalculator, PeriodAggregator, PeriodView, StaleKind,
    SystemClock,
};
use meter_store::{LedgerStore, WalLedgerStore};
use meter_types::{CalendarDate, ConsumptionRecord, MonthKey, PeriodSelector, RecordId};
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::cli::*;
use crate::config::MeterConfig;
use crate::report;

type Ledger = ConsumptionCalculator<WalLedgerStore, SystemClock>;

/// Per-invocation output settings.
struct Output {
    format: OutputFormat,
    unit: String,
}

impl Output {
    fn json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config_path = MeterConfig::locate(cli.config.as_deref());
    let mut config = MeterConfig::load(&config_path)?;
    debug!(path = %config_path.display(), "configuration loaded");
    let out = Output {
        format: cli.format,
        unit: config.unit.clone(),
    };

    if let Command::Config(args) = cli.command {
        return cmd_config(args, &mut config, &config_path, &out);
    }

    let ledger = open_ledger(&config)?;
    let today = ledger.clock().today()?;

    match cli.command {
        Command::Record(args) => cmd_record(&ledger, args, &out).await,
        Command::Latest(args) => cmd_latest(&ledger, args, today, &out).await,
        Command::List(period) => {
            let selector = period.resolve(config.preferences.view_mode, today)?;
            cmd_list(&ledger, selector, &out).await
        }
        Command::Rollup(args) => cmd_rollup(&ledger, args, &out).await,
        Command::Report(args) => cmd_report(&ledger, args, today, &config, &out).await,
        Command::Edit(args) => cmd_edit(&ledger, args, &out).await,
        Command::Delete(args) => cmd_delete(&ledger, args, &out).await,
        Command::Clear(args) => cmd_clear(&ledger, args, &out).await,
        Command::Audit(period) => {
            let selector = period.explicit(today)?.unwrap_or(PeriodSelector::All);
            cmd_audit(&ledger, selector, &out).await
        }
        Command::Compact => cmd_compact(&ledger, &out),
        Command::Watch(period) => {
            let selector = period.resolve(config.preferences.view_mode, today)?;
            cmd_watch(ledger, selector, out).await
        }
        Command::Config(_) => Ok(()),
    }
}

fn open_ledger(config: &MeterConfig) -> anyhow::Result<Ledger> {
    let path = config.wal_path();
    let store = WalLedgerStore::open(&path, config.wal_config())
        .with_context(|| format!("opening ledger at {}", path.display()))?;
    Ok(ConsumptionCalculator::new(Arc::new(store), SystemClock))
}

async fn cmd_record(ledger: &Ledger, args: RecordArgs, out: &Output) -> anyhow::Result<()> {
    let record = match args.date {
        Some(date) => ledger.register_reading_on(date, args.reading).await?,
        None => ledger.register_reading(args.reading).await?,
    };
    if out.is_json() {
        return out.json(&record);
    }
    println!(
        "{} Recorded {:.2} {} on {}",
        "✓".green().bold(),
        record.reading,
        out.unit,
        record.date.to_string().bold()
    );
    println!(
        "  Consumption: {:.2} {unit}  Month to date: {:.2} {unit}",
        record.daily_delta,
        record.monthly_running_total,
        unit = out.unit
    );
    println!("  ID: {}", record.id.short_id().yellow());
    Ok(())
}

async fn cmd_latest(
    ledger: &Ledger,
    args: LatestArgs,
    today: CalendarDate,
    out: &Output,
) -> anyhow::Result<()> {
    let month = MonthKey::new(
        args.month.unwrap_or(today.month()),
        args.year.unwrap_or(today.year()),
    )?;
    let latest = ledger.latest_reading(month).await?;
    if out.is_json() {
        return out.json(&json!({ "month": month.to_string(), "reading": latest }));
    }
    match latest {
        Some(reading) => println!(
            "Latest reading for {} {}: {}",
            month.month_name(),
            month.year(),
            format!("{reading:.2} {}", out.unit).bold()
        ),
        None => println!("No readings for {} {}.", month.month_name(), month.year()),
    }
    Ok(())
}

async fn cmd_list(ledger: &Ledger, selector: PeriodSelector, out: &Output) -> anyhow::Result<()> {
    let view = ledger.view(selector).await?;
    if out.is_json() {
        return out.json(&json!({
            "period": selector.to_string(),
            "rows": view.rows,
            "total": view.total,
        }));
    }
    print_view(selector, &view, out);
    Ok(())
}

fn print_view(selector: PeriodSelector, view: &PeriodView, out: &Output) {
    println!(
        "{} ({} records)",
        selector.to_string().bold(),
        view.rows.len()
    );
    if view.is_empty() {
        println!("  No records.");
        return;
    }
    println!(
        "  {:<8}  {:<10}  {:>12}  {:>12}  {:>12}",
        "ID".dimmed(),
        "DATE".dimmed(),
        "READING".dimmed(),
        "CONSUMPTION".dimmed(),
        "ACCUMULATED".dimmed()
    );
    for row in &view.rows {
        println!(
            "  {:<8}  {:<10}  {:>12.2}  {:>12.2}  {:>12.2}",
            row.id.short_id().yellow(),
            row.date.to_string(),
            row.reading,
            row.daily_delta,
            row.running_total
        );
    }
    println!("Total: {}", format!("{:.2} {}", view.total, out.unit).green().bold());
}

async fn cmd_rollup(ledger: &Ledger, args: RollupArgs, out: &Output) -> anyhow::Result<()> {
    let selector = args.year.map_or(PeriodSelector::All, PeriodSelector::Year);
    let records = ledger.records_for_period(selector).await?;
    let months = PeriodAggregator::monthly_rollup(&records);
    let years = PeriodAggregator::annual_rollup(&records);
    let total = PeriodAggregator::all_time_total(&records);

    if out.is_json() {
        return out.json(&json!({ "months": months, "years": years, "total": total }));
    }
    if months.is_empty() {
        println!("No records.");
        return Ok(());
    }
    for month in &months {
        println!(
            "  {:<16} {:>3} readings  {:>12.2} {}",
            format!("{} {}", month.month.month_name(), month.month.year()),
            month.readings,
            month.consumption,
            out.unit
        );
    }
    for year in &years {
        println!(
            "{} {:>4}: {:.2} {} over {} month(s)",
            "Year".bold(),
            year.year,
            year.consumption,
            out.unit,
            year.months
        );
    }
    println!("Total: {}", format!("{total:.2} {}", out.unit).green().bold());
    Ok(())
}

async fn cmd_report(
    ledger: &Ledger,
    args: ReportArgs,
    today: CalendarDate,
    config: &MeterConfig,
    out: &Output,
) -> anyhow::Result<()> {
    let month = MonthKey::new(
        args.month.unwrap_or(today.month()),
        args.year.unwrap_or(today.year()),
    )?;
    let view = ledger.view(PeriodSelector::Month(month)).await?;
    let body = if args.html {
        report::render_html(month, today, &config.unit, &view)
    } else {
        report::render_text(month, today, &config.unit, &view)
    };
    let recipients = &config.preferences.report_recipients;

    if out.is_json() {
        return out.json(&json!({
            "month": month.to_string(),
            "content_type": if args.html { "text/html" } else { "text/plain" },
            "body": body,
            "recipients": recipients,
        }));
    }
    print!("{body}");
    if recipients.is_empty() {
        eprintln!("{}", "No report recipients configured.".dimmed());
    } else {
        eprintln!("Recipients: {}", recipients.join(", "));
    }
    Ok(())
}

async fn cmd_edit(ledger: &Ledger, args: EditArgs, out: &Output) -> anyhow::Result<()> {
    if args.reading.is_none() && args.date.is_none() {
        bail!("nothing to change: pass --reading and/or --date");
    }
    let id = resolve_id(ledger, &args.id).await?;
    let mut record = ledger
        .store()
        .get(&id)
        .await?
        .with_context(|| format!("record {id} not found"))?;
    if let Some(reading) = args.reading {
        record.reading = reading;
    }
    if let Some(date) = args.date {
        record.date = date;
    }

    let previous = ledger.update_record(record.clone()).await?;
    if out.is_json() {
        return out.json(&json!({ "previous": previous, "current": record }));
    }
    println!("{} Updated {}", "✓".green().bold(), id.short_id().yellow());
    print_change(&previous, &record);
    println!(
        "  {}",
        "Consumption figures were not recomputed; run `meter audit` to review.".dimmed()
    );
    Ok(())
}

fn print_change(previous: &ConsumptionRecord, current: &ConsumptionRecord) {
    if previous.date != current.date {
        println!("  Date: {} → {}", previous.date, current.date.to_string().bold());
    }
    if previous.reading != current.reading {
        println!(
            "  Reading: {:.2} → {}",
            previous.reading,
            format!("{:.2}", current.reading).bold()
        );
    }
}

async fn cmd_delete(ledger: &Ledger, args: DeleteArgs, out: &Output) -> anyhow::Result<()> {
    let id = resolve_id(ledger, &args.id).await?;
    let removed = ledger.delete_record(id).await?;
    if out.is_json() {
        return out.json(&removed);
    }
    println!(
        "{} Deleted {} ({}, {:.2} {})",
        "✓".green().bold(),
        id.short_id().yellow(),
        removed.date,
        removed.reading,
        out.unit
    );
    Ok(())
}

async fn cmd_clear(ledger: &Ledger, args: ClearArgs, out: &Output) -> anyhow::Result<()> {
    if !args.yes {
        bail!("refusing to delete every record without --yes");
    }
    let removed = ledger.clear().await?;
    if out.is_json() {
        return out.json(&json!({ "removed": removed }));
    }
    println!("{} Cleared {} record(s)", "✓".green().bold(), removed);
    Ok(())
}

async fn cmd_audit(ledger: &Ledger, selector: PeriodSelector, out: &Output) -> anyhow::Result<()> {
    let report = ledger.audit(selector).await?;
    if out.is_json() {
        return out.json(&report);
    }
    print_audit(selector, &report);
    Ok(())
}

fn print_audit(selector: PeriodSelector, report: &AuditReport) {
    println!(
        "Audited {} record(s) in {} month(s) for {}",
        report.records_checked,
        report.months_checked,
        selector.to_string().bold()
    );
    if report.is_consistent() {
        println!("{} No stale records.", "✓".green().bold());
        return;
    }
    for finding in &report.findings {
        let detail = match &finding.kind {
            StaleKind::DeltaMismatch { expected, actual } => {
                format!("consumption {actual:.2}, expected {expected:.2}")
            }
            StaleKind::RunningTotalMismatch { expected, actual } => {
                format!("accumulated {actual:.2}, expected {expected:.2}")
            }
            StaleKind::DuplicateDate { first } => {
                format!("second record for this day (first: {})", first.short_id())
            }
            StaleKind::NegativeDelta { delta } => {
                format!("reading is {:.2} below the previous one", -delta)
            }
        };
        println!(
            "  {} {} {}  {}",
            "✗".red().bold(),
            finding.id.short_id().yellow(),
            finding.date,
            detail
        );
    }
    println!("{} finding(s)", report.findings.len().to_string().red().bold());
}

fn cmd_compact(ledger: &Ledger, out: &Output) -> anyhow::Result<()> {
    let store = ledger.store();
    let before = store.log_size();
    let records = store.compact()?;
    let after = store.log_size();
    if out.is_json() {
        return out.json(&json!({ "records": records, "bytes_before": before, "bytes_after": after }));
    }
    println!(
        "{} Compacted ledger: {} record(s), {} → {} bytes",
        "✓".green().bold(),
        records,
        before,
        after
    );
    Ok(())
}

/// Read readings from stdin, one per line (`<reading> [date]`), while a
/// background task prints the period every time it changes.
async fn cmd_watch(ledger: Ledger, selector: PeriodSelector, out: Output) -> anyhow::Result<()> {
    let out = Arc::new(out);
    let mut live = ledger.watch(selector);
    let printer = {
        let out = out.clone();
        tokio::spawn(async move {
            while let Some(view) = live.next().await {
                match view {
                    Ok(view) if out.is_json() => {
                        if let Err(err) = out.json(&view) {
                            eprintln!("{} {err}", "error:".red().bold());
                        }
                    }
                    Ok(view) => print_view(live.selector(), &view, &out),
                    Err(err) => eprintln!("{} {err}", "error:".red().bold()),
                }
            }
        })
    };

    eprintln!(
        "{}",
        "Enter readings as `<reading> [dd/mm/yyyy]`; Ctrl-D to stop.".dimmed()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(err) = register_line(&ledger, line).await {
            eprintln!("{} {err}", "rejected:".red().bold());
        }
    }

    // Dropping the ledger closes the store, which ends the live view.
    drop(ledger);
    printer.await.context("watch printer task")?;
    Ok(())
}

async fn register_line(ledger: &Ledger, line: &str) -> anyhow::Result<()> {
    let mut parts = line.split_whitespace();
    let reading: f64 = parts
        .next()
        .unwrap_or_default()
        .parse()
        .with_context(|| format!("'{line}' does not start with a number"))?;
    match parts.next() {
        Some(date) => ledger.register_reading_on(date.parse()?, reading).await?,
        None => ledger.register_reading(reading).await?,
    };
    Ok(())
}

/// Accept a full record ID or a unique prefix of one.
async fn resolve_id(ledger: &Ledger, raw: &str) -> anyhow::Result<RecordId> {
    if let Ok(id) = raw.parse::<RecordId>() {
        return Ok(id);
    }
    let matches = matching_ids(&ledger.store().query_all().await?, raw);
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("no record matches '{raw}'"),
        _ => bail!("'{raw}' is ambiguous: {} records match", matches.len()),
    }
}

fn matching_ids(records: &[ConsumptionRecord], prefix: &str) -> Vec<RecordId> {
    let prefix = prefix.to_ascii_lowercase();
    if prefix.is_empty() {
        return Vec::new();
    }
    records
        .iter()
        .map(|r| r.id)
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect()
}

fn cmd_config(
    args: ConfigArgs,
    config: &mut MeterConfig,
    path: &Path,
    out: &Output,
) -> anyhow::Result<()> {
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            if out.is_json() {
                return out.json(&*config);
            }
            println!("# {}", path.display().to_string().dimmed());
            print!("{}", toml::to_string_pretty(&*config)?);
        }
        ConfigAction::AddRecipient { email } => {
            if config.add_recipient(&email)? {
                config.save(path)?;
                println!("{} Added recipient {}", "✓".green().bold(), email.trim().bold());
            } else {
                println!("{} is already a recipient", email.trim().bold());
            }
        }
        ConfigAction::RemoveRecipient { email } => {
            if config.remove_recipient(&email) {
                config.save(path)?;
                println!("{} Removed recipient {}", "✓".green().bold(), email.trim().bold());
            } else {
                bail!("{} is not a recipient", email.trim());
            }
        }
        ConfigAction::ViewMode { mode } => {
            config.preferences.view_mode = mode;
            config.save(path)?;
            println!("{} View mode set to {:?}", "✓".green().bold(), mode);
        }
    }
    Ok(())
}
