use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const LOG_FILE_PREFIX: &str = "offline-queue.log";
const LOG_RETENTION_DAYS: u64 = 7;

/// Logging configuration for binaries embedding the offline queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// Initialize the logging system
///
/// `RUST_LOG` and `LOG_FORMAT` take precedence over the configured level
/// and format. Console output goes to stderr; stdout is reserved for
/// command output. Keep the returned guard alive for the life of the
/// process or buffered file output is lost.
pub fn init_logging(config: &LoggingConfig) -> WorkerGuard {
    let filter = build_filter(config);
    let json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| config.format.clone())
        .eq_ignore_ascii_case("json");

    // offline-queue.log.YYYY-MM-DD
    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
        &config.dir,
        LOG_FILE_PREFIX,
    ));

    let (console_layer, file_layer) = if json {
        (
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed(),
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        )
    } else {
        (
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed(),
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        )
    };

    Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Err(e) = cleanup_old_logs(&config.dir, LOG_RETENTION_DAYS) {
        eprintln!("Failed to clean up old logs: {}", e);
    }

    guard
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    config
        .overrides
        .iter()
        .fold(base, |filter, (module, level)| {
            match format!("{}={}", module, level).parse() {
                Ok(directive) => filter.add_directive(directive),
                Err(_) => {
                    eprintln!("Invalid log directive: {}={}", module, level);
                    filter
                }
            }
        })
}

/// Clean up log files older than `days` days
fn cleanup_old_logs(dir: &str, days: u64) -> std::io::Result<usize> {
    let path = Path::new(dir);
    if !path.exists() {
        return Ok(0);
    }

    let now = std::time::SystemTime::now();
    let threshold = std::time::Duration::from_secs(days * 24 * 3600);
    let mut removed = 0;

    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_ours {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if matches!(age, Some(age) if age > threshold) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }
    Ok(removed)
}
