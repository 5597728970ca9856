//! CLI entry point for the offline queue

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use offline_queue_core::connectivity::{DEFAULT_GATEWAY_HOST, DEFAULT_GATEWAY_PORT};
use offline_queue_core::logging::{init_logging, LoggingConfig};
use offline_queue_core::utils::{ms_to_datetime, truncate};
use offline_queue_core::{
    check_gateway, ConfigLoader, ConnectivityMonitor, ConnectivityState, MessageQueue,
    MessageStatus, OfflineQueueConfig,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "offline-queue")]
#[command(about = "Inspect and maintain the offline message queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show queue counts and current connectivity
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Probe the configured reachability endpoint
    Check {
        /// Seconds to keep probing until online
        #[arg(short, long)]
        wait: Option<u64>,
    },
    /// Delete completed and failed messages older than the retention window
    Cleanup {
        /// Age threshold in hours (defaults to maxQueueAgeHours)
        #[arg(short, long)]
        max_age_hours: Option<u64>,
    },
    /// List queued messages, oldest first
    List {
        /// Only messages with this status (pending, processing, failed, completed)
        #[arg(short, long)]
        status: Option<MessageStatus>,
        /// Maximum number of messages
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check whether the local gateway answers its health endpoint
    Gateway {
        #[arg(long, default_value = DEFAULT_GATEWAY_HOST)]
        host: String,
        #[arg(short, long, default_value_t = DEFAULT_GATEWAY_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    let _log_guard = init_logging(&LoggingConfig {
        level: "warn".to_string(),
        dir: config_loader.config_dir().join("logs").display().to_string(),
        ..LoggingConfig::default()
    });

    match cli.command {
        Commands::Status { json } => {
            run_status(&config_loader, json, &mut std::io::stdout()).await?
        }
        Commands::Check { wait } => run_check(&config_loader, wait).await?,
        Commands::Cleanup { max_age_hours } => run_cleanup(&config_loader, max_age_hours).await?,
        Commands::List {
            status,
            limit,
            json,
        } => run_list(&config_loader, status, limit, json).await?,
        Commands::Gateway { host, port } => run_gateway(&host, port).await?,
    }

    Ok(())
}

fn load_config(loader: &ConfigLoader) -> Result<OfflineQueueConfig> {
    loader.load().with_context(|| {
        format!(
            "Failed to load configuration from {}",
            loader.config_dir().display()
        )
    })
}

async fn open_queue(config: &OfflineQueueConfig) -> Result<MessageQueue> {
    let path = config.resolved_db_path();
    MessageQueue::open(&path)
        .await
        .with_context(|| format!("Failed to open queue at {}", path.display()))
}

fn format_time(ms: Option<i64>) -> String {
    ms.and_then(ms_to_datetime)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn styled_state(state: ConnectivityState) -> console::StyledObject<&'static str> {
    match state {
        ConnectivityState::Online => style(state.as_str()).green(),
        ConnectivityState::Offline => style(state.as_str()).red(),
        ConnectivityState::Unknown => style(state.as_str()).dim(),
    }
}

/// Show queue stats and connectivity
///
/// With `json`, `out` receives exactly one JSON document.
async fn run_status(loader: &ConfigLoader, json: bool, out: &mut impl Write) -> Result<()> {
    let config = load_config(loader)?;
    let queue = open_queue(&config).await?;
    let stats = queue.stats().await?;
    queue.close().await;

    let monitor = ConnectivityMonitor::from_config(&config)?;
    let state = monitor.check().await;

    if json {
        let report = serde_json::json!({
            "stats": stats,
            "connectivity": state,
            "dbPath": config.resolved_db_path(),
            "checkUrl": config.check_url(),
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    writeln!(out, "{}", style("Offline Queue Status").bold().cyan())?;
    writeln!(out)?;

    writeln!(out, "{}", style("Configuration:").bold())?;
    writeln!(out, "  Config directory: {}", loader.config_dir().display())?;
    writeln!(out, "  Database: {}", config.resolved_db_path().display())?;
    writeln!(
        out,
        "  Auto sync: {}",
        if config.auto_sync { "on" } else { "off" }
    )?;
    writeln!(
        out,
        "  Limits: {} pending, {}h retention",
        config.max_queue_size, config.max_queue_age_hours
    )?;
    writeln!(out)?;

    writeln!(out, "{}", style("Connectivity:").bold())?;
    writeln!(out, "  {} ({})", styled_state(state), config.check_url())?;
    writeln!(out)?;

    writeln!(out, "{}", style("Messages:").bold())?;
    writeln!(out, "  Pending: {}", stats.pending)?;
    writeln!(out, "  Processing: {}", stats.processing)?;
    let failed = if stats.failed > 0 {
        style(stats.failed.to_string()).yellow()
    } else {
        style(stats.failed.to_string())
    };
    writeln!(out, "  Failed: {}", failed)?;
    writeln!(out, "  Completed: {}", stats.completed)?;
    writeln!(out, "  Total: {}", stats.total)?;
    writeln!(out, "  Oldest pending: {}", format_time(stats.oldest_queued_at))?;

    Ok(())
}

/// Probe connectivity, optionally waiting for it to come online
async fn run_check(loader: &ConfigLoader, wait: Option<u64>) -> Result<()> {
    let config = load_config(loader)?;
    let monitor = ConnectivityMonitor::from_config(&config)?;

    let mut state = monitor.check().await;
    if let Some(secs) = wait.filter(|s| *s > 0) {
        if !state.is_online() {
            println!(
                "{} waiting up to {}s for connectivity...",
                style("Offline,").yellow(),
                secs
            );
            monitor.start();
            monitor.wait_for_online(Duration::from_secs(secs)).await;
            monitor.stop();
            state = monitor.state();
        }
    }

    info!("Connectivity check against {}: {}", config.check_url(), state);
    println!("Connectivity: {}", styled_state(state));
    Ok(())
}

/// Remove finished messages past the age threshold
async fn run_cleanup(loader: &ConfigLoader, max_age_hours: Option<u64>) -> Result<()> {
    let config = load_config(loader)?;
    let hours = max_age_hours.unwrap_or(config.max_queue_age_hours);

    let queue = open_queue(&config).await?;
    let removed = queue
        .cleanup(offline_queue_core::config::hours_to_ms(hours))
        .await?;
    queue.close().await;

    println!(
        "{} Removed {} finished message(s) older than {}h",
        style("✓").green().bold(),
        removed,
        hours
    );
    Ok(())
}

/// Print queued messages
async fn run_list(
    loader: &ConfigLoader,
    status: Option<MessageStatus>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let config = load_config(loader)?;
    let queue = open_queue(&config).await?;
    let messages = queue.list(status, limit).await?;
    queue.close().await;
    debug!("Listing {} message(s)", messages.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!("No queued messages.");
        return Ok(());
    }

    println!("{}", style("Queued Messages").bold().cyan());
    println!();

    for msg in messages {
        let status = match msg.status {
            MessageStatus::Pending => style(msg.status.as_str()).cyan(),
            MessageStatus::Processing => style(msg.status.as_str()).yellow(),
            MessageStatus::Failed => style(msg.status.as_str()).red(),
            MessageStatus::Completed => style(msg.status.as_str()).green(),
        };

        println!("  {} ({})", style(&msg.id).bold(), status);
        println!(
            "    Route: {}/{} chat {} from {}",
            msg.channel, msg.account_id, msg.chat_id, msg.sender_id
        );
        println!("    Queued: {}", format_time(Some(msg.queued_at)));
        println!(
            "    Attempts: {} (last: {})",
            msg.attempts,
            format_time(msg.last_attempt_at)
        );
        println!("    Body: {}", truncate(&msg.body, 80));
        if let Some(error) = &msg.last_error {
            println!("    Error: {}", style(error).red());
        }
        println!();
    }

    Ok(())
}

/// Probe the local gateway health endpoint
async fn run_gateway(host: &str, port: u16) -> Result<()> {
    if check_gateway(host, port).await {
        println!(
            "{} Gateway at {}:{} is up",
            style("✓").green().bold(),
            host,
            port
        );
    } else {
        println!(
            "{} Gateway at {}:{} is not responding",
            style("✗").red().bold(),
            host,
            port
        );
    }
    Ok(())
}
