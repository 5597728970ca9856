//! Configuration validation rules.

use super::schema::OfflineQueueConfig;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &OfflineQueueConfig) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.db_path.as_os_str().is_empty() {
        errors.push("dbPath must not be empty".to_string());
    }
    if config.connectivity_check_interval_sec == 0 {
        errors.push("connectivityCheckIntervalSec must be > 0".to_string());
    }
    if config.max_queue_size == 0 {
        errors.push("maxQueueSize must be > 0".to_string());
    }
    if config.max_queue_age_hours == 0 {
        errors.push("maxQueueAgeHours must be > 0".to_string());
    }
    if config.sync_batch_size == 0 {
        errors.push("syncBatchSize must be > 0".to_string());
    }

    if let Some(url) = &config.connectivity_check_url {
        match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => errors.push(format!(
                "connectivityCheckUrl must use http or https, got '{}'",
                parsed.scheme()
            )),
            Err(e) => errors.push(format!("connectivityCheckUrl is invalid: {}", e)),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
