//! Configuration loading and management

use super::schema::{default_config_dir, OfflineQueueConfig};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "OFFLINE_QUEUE__";

/// Configuration loader
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a new config loader with the default config directory
    pub fn new() -> Self {
        Self {
            config_dir: default_config_dir(),
        }
    }

    /// Create a new config loader with a custom config directory
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file and environment
    ///
    /// Layers, lowest first: defaults, `config.json`, `OFFLINE_QUEUE__*`
    /// variables. Unknown keys from any layer are a hard error.
    pub fn load(&self) -> crate::Result<OfflineQueueConfig> {
        let Value::Object(mut layered) = serde_json::to_value(OfflineQueueConfig::default())?
        else {
            return Err(crate::Error::Config("defaults are not an object".to_string()));
        };

        if let Some(file_layer) = self.read_file_layer()? {
            layered.extend(file_layer);
        }
        layered.extend(env_layer(std::env::vars()));

        OfflineQueueConfig::from_value(Value::Object(layered))
    }

    fn read_file_layer(&self) -> crate::Result<Option<Map<String, Value>>> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(crate::Error::Config(format!(
                "{}: expected a JSON object",
                path.display()
            ))),
            Err(e) => Err(crate::Error::Config(format!("{}: {}", path.display(), e))),
        }
    }

    /// Save configuration to file
    pub fn save(&self, config: &OfflineQueueConfig) -> crate::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(self.config_path(), content)?;
        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Numbers, booleans and JSON literals keep their type; anything else is a string
fn parse_env_value(raw: &str) -> Value {
    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

/// `SYNC_BATCH_SIZE` -> `syncBatchSize`
fn env_suffix_to_key(suffix: &str) -> String {
    let mut key = String::with_capacity(suffix.len());
    for (i, part) in suffix.split('_').filter(|s| !s.is_empty()).enumerate() {
        let lower = part.to_ascii_lowercase();
        if i == 0 {
            key.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                key.push(first.to_ascii_uppercase());
                key.push_str(chars.as_str());
            }
        }
    }
    key
}

fn env_layer(vars: impl Iterator<Item = (String, String)>) -> Map<String, Value> {
    vars.filter_map(|(name, raw)| {
        let field = env_suffix_to_key(name.strip_prefix(ENV_PREFIX)?);
        if field.is_empty() {
            return None;
        }
        let value = match field.as_str() {
            // Strings even when they look like JSON
            "dbPath" | "connectivityCheckUrl" => Value::String(raw),
            _ => parse_env_value(&raw),
        };
        Some((field, value))
    })
    .collect()
}
