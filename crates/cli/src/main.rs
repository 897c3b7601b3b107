use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use dockview_api::ReplayClient;
use dockview_core::DaemonInfo;
use dockview_overview::size::format_size;
use dockview_overview::storage::usage_from_info;
use dockview_overview::{HeadlessView, Overview, OverviewConfig, OverviewEvent, UsageDisplay, ViewSnapshot};
use dockview_store::ContainerFilter;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dockview", version, about = "Container daemon overview (headless)")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the overview from a recorded session and print the final tables
    Replay {
        /// JSON-lines session file
        file: PathBuf,
        /// Minimum seconds between storage usage queries
        #[arg(long = "interval-secs")]
        interval_secs: Option<u64>,
        /// Which containers to list: all|running
        #[arg(long = "filter")]
        filter: Option<ContainerFilter>,
        /// Pause between replayed events, in milliseconds
        #[arg(long = "event-delay-ms", default_value_t = 0)]
        event_delay_ms: u64,
    },
    /// Render the storage usage line for one daemon info document
    Storage {
        /// JSON file holding `{"Driver": ..., "DriverStatus": [...]}`
        file: PathBuf,
    },
}

fn init_tracing() {
    let env = std::env::var("DOCKVIEW_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("DOCKVIEW_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid DOCKVIEW_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { file, interval_secs, filter, event_delay_ms } => {
            let mut config = OverviewConfig::from_env();
            if let Some(secs) = interval_secs {
                config.storage_interval = Duration::from_secs(secs);
            }
            if let Some(f) = filter {
                config.container_filter = f;
            }
            config.exit_when_drained = true;
            info!(file = %file.display(), interval_ms = config.storage_interval.as_millis() as u64, filter = ?config.container_filter, "replay invoked");

            let client = ReplayClient::load(&file)?
                .with_event_delay(Duration::from_millis(event_delay_ms))
                .with_queue_cap(config.queue_cap);
            info!(events = client.event_count(), "replay: starting overview");

            let overview = Overview::new(config, Arc::new(client), HeadlessView::default());
            let tx = overview.sender();
            let handle = overview.handle();
            let ctrl_c = tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received; hiding overview");
                    let _ = tx.send(OverviewEvent::Hide);
                }
            });
            let view = overview.run().await.context("overview run failed")?;
            ctrl_c.abort();

            let snap = handle.current();
            match cli.output {
                Output::Human => print_snapshot(&snap),
                Output::Json => println!("{}", serde_json::to_string_pretty(&*snap)?),
            }
            if view.containers.len() != snap.containers.len() + snap.filtered_out {
                warn!(table = view.containers.len(), published = snap.containers.len(), "replay: view and snapshot disagree");
            }
        }
        Commands::Storage { file } => {
            info!(file = %file.display(), "storage invoked");
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let daemon_info = DaemonInfo::from_json(&bytes).with_context(|| format!("decoding {}", file.display()))?;
            let usage = usage_from_info(&daemon_info);
            match cli.output {
                Output::Human => println!("{}", storage_line(&usage)),
                Output::Json => println!("{}", serde_json::to_string_pretty(&usage)?),
            }
        }
    }

    Ok(())
}

fn print_snapshot(snap: &ViewSnapshot) {
    println!("NAME                 IMAGE                STATE        AGE");
    for c in snap.containers.iter() {
        println!("{:<20} {:<20} {:<12} {}", c.name, c.image, c.state, render_age(c.created));
    }
    if snap.filtered_out > 0 {
        println!("({} stopped containers hidden)", snap.filtered_out);
    }
    println!();
    println!("TAG                            ID            SIZE       AGE");
    for i in snap.images.iter() {
        println!("{:<30} {:<13} {:<10} {}", i.primary_tag(), i.id.short(), format_size(i.virtual_size), render_age(i.created));
    }
    println!();
    println!("{}", storage_line(&snap.usage));
}

fn storage_line(usage: &UsageDisplay) -> String {
    match usage {
        UsageDisplay::Unknown => "storage: Unknown".to_string(),
        UsageDisplay::Known { text, danger, sparse_warning, .. } => {
            let pct = usage.fraction().map(|f| f * 100.0).unwrap_or(0.0);
            let mut line = format!("storage: {} ({:.0}%)", text, pct);
            if *danger {
                line.push_str(" [almost full]");
            }
            if *sparse_warning {
                line.push_str(" [sparse pool: total may exceed disk]");
            }
            line
        }
    }
}

fn render_age(created: Option<DateTime<Utc>>) -> String {
    let Some(ts) = created else { return "-".to_string() };
    let mut secs = (Utc::now() - ts).num_seconds().max(0) as u64;
    let days = secs / 86_400; secs %= 86_400;
    let hours = secs / 3600; secs %= 3600;
    let mins = secs / 60; secs %= 60;
    if days > 0 { format!("{}d{}h", days, hours) }
    else if hours > 0 { format!("{}h{}m", hours, mins) }
    else if mins > 0 { format!("{}m", mins) }
    else { format!("{}s", secs) }
}
