use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use serde::Serialize;

use costbar_lib::api::ProviderApis;
use costbar_lib::logging;
use costbar_lib::sources::{format_currency, Selection, StrategySelector};
use costbar_lib::storage::{load_widget_snapshot, snapshot_path, WidgetSnapshotSink};
use costbar_lib::{
    CostError, CostSnapshot, PollScheduler, SnapshotSink, SourceKind, WidgetSettings,
};

#[derive(Parser)]
#[command(name = "costbar")]
#[command(version, about = "Month-to-date AWS spend for desktop widgets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Settings file (default: <config_dir>/CostBar/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use simulated data instead of AWS
    #[arg(long, global = true)]
    simulated: bool,

    /// Month to display: "current", a month name, or YYYY-MM
    #[arg(long, global = true)]
    month: Option<String>,

    /// Refresh interval in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Print snapshots as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to the debug log file
    #[arg(long, global = true)]
    log_file: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Poll until Ctrl-C, printing and persisting every snapshot (default)
    Watch,
    /// Fetch and print a single snapshot
    Once,
    /// Print the last persisted snapshot
    Last,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotPayload<'a> {
    source: SourceKind,
    #[serde(flatten)]
    snapshot: &'a CostSnapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.log_file);

    let settings = load_settings(&cli)?;
    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => run_watch(&cli, settings).await,
        Commands::Once => run_once(&cli, settings).await,
        Commands::Last => run_last(&cli),
    }
}

fn load_settings(cli: &Cli) -> Result<WidgetSettings> {
    let mut settings = match &cli.config {
        Some(path) => WidgetSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => WidgetSettings::load_default().context("Failed to load settings")?,
    };

    if cli.simulated {
        settings.use_simulated_data = true;
    }
    if let Some(month) = &cli.month {
        settings.display_month = month.clone();
    }
    if let Some(interval) = cli.interval {
        settings.refresh_interval = interval;
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

async fn select(settings: &WidgetSettings) -> Result<Selection> {
    let apis = ProviderApis::from_environment().await;
    let selection = StrategySelector::new(settings.clone(), apis)
        .select_or_simulate()
        .await
        .context("Failed to select a cost source")?;
    if let Some(fallback) = &selection.fallback {
        eprintln!("Note: {fallback}");
    }
    Ok(selection)
}

async fn run_once(cli: &Cli, settings: WidgetSettings) -> Result<()> {
    let Selection { source, probe, .. } = select(&settings).await?;
    let snapshot = match probe {
        Some(snapshot) => snapshot,
        None => source.fetch().await.context("Failed to fetch costs")?,
    };

    let printer = TerminalSink::new(cli, &settings, source.kind());
    printer.deliver(&snapshot);

    match snapshot_path() {
        Ok(path) => WidgetSnapshotSink::new(path, source.kind()).deliver(&snapshot),
        Err(e) => tracing::warn!("Widget snapshot not written: {}", e),
    }
    Ok(())
}

async fn run_watch(cli: &Cli, settings: WidgetSettings) -> Result<()> {
    let Selection { source, probe, .. } = select(&settings).await?;
    let kind = source.kind();

    let mut sinks: Vec<Arc<dyn SnapshotSink>> =
        vec![Arc::new(TerminalSink::new(cli, &settings, kind))];
    match WidgetSnapshotSink::at_default_location(kind) {
        Ok(sink) => sinks.push(Arc::new(sink)),
        Err(e) => tracing::warn!("Widget snapshot disabled: {}", e),
    }

    let mut scheduler = PollScheduler::new(
        source,
        Arc::new(FanOutSink(sinks)),
        settings.refresh_duration(),
    )?;
    if let Some(snapshot) = probe {
        scheduler = scheduler.with_initial_snapshot(snapshot);
    }
    scheduler.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    scheduler.stop().await;
    Ok(())
}

fn run_last(cli: &Cli) -> Result<()> {
    let path = snapshot_path()?;
    let Some(stored) = load_widget_snapshot(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?
    else {
        bail!("No snapshot saved yet. Run `costbar once` or `costbar watch` first.");
    };

    if cli.json {
        print_json(&stored, cli.pretty)?;
    } else {
        println!("Saved {} ({})", stored.updated_at, stored.source.as_str());
        println!("{}", render_text(&stored.snapshot, "Month to Date", usize::MAX));
    }
    Ok(())
}

/// Prints each snapshot to stdout
struct TerminalSink {
    json: bool,
    pretty: bool,
    display_limit: usize,
    heading: String,
    source: SourceKind,
}

impl TerminalSink {
    fn new(cli: &Cli, settings: &WidgetSettings, source: SourceKind) -> Self {
        let heading = match settings.display_period(Local::now().date_naive()) {
            Ok(period) if source == SourceKind::HistoricalLedger => period.label(),
            _ => "Month to Date".to_string(),
        };
        Self {
            json: cli.json,
            pretty: cli.pretty,
            display_limit: settings.display_limit,
            heading,
            source,
        }
    }
}

impl SnapshotSink for TerminalSink {
    fn deliver(&self, snapshot: &CostSnapshot) {
        if self.json {
            let payload = SnapshotPayload {
                source: self.source,
                snapshot,
            };
            if let Err(e) = print_json(&payload, self.pretty) {
                tracing::warn!("Failed to print snapshot: {}", e);
            }
            return;
        }
        println!("{}\n", render_text(snapshot, &self.heading, self.display_limit));
    }

    fn report_error(&self, error: &CostError) {
        eprintln!("Refresh failed: {error}");
    }
}

struct FanOutSink(Vec<Arc<dyn SnapshotSink>>);

impl SnapshotSink for FanOutSink {
    fn deliver(&self, snapshot: &CostSnapshot) {
        for sink in &self.0 {
            sink.deliver(snapshot);
        }
    }

    fn report_error(&self, error: &CostError) {
        for sink in &self.0 {
            sink.report_error(error);
        }
    }
}

fn render_text(snapshot: &CostSnapshot, heading: &str, limit: usize) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "AWS Costs ({heading}): {}",
        format_currency(snapshot.month_to_date_total())
    ));
    lines.push(format!(
        "Updated: {}",
        snapshot.as_of().with_timezone(&Local).format("%Y-%m-%d %H:%M")
    ));

    let services = snapshot.display_services(limit);
    if services.is_empty() {
        lines.push("No billable services".to_string());
    }
    for service in services {
        let activity = if service.activity_count > 0 {
            format!("  ({} calls)", service.activity_count)
        } else {
            String::new()
        };
        lines.push(format!(
            "  {:<40} {:>10}{activity}",
            service.name,
            format_currency(service.cost)
        ));
    }
    lines.join("\n")
}

fn print_json<T: Serialize>(payload: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(payload)
    } else {
        serde_json::to_string(payload)
    }
    .context("Failed to serialize output")?;
    println!("{output}");
    Ok(())
}
