use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_DEBOUNCE_MS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub debounce_ms: u64,
    /// Allowed scroll error, in renderer units, when verifying a restore.
    pub verify_tolerance: f64,
    pub page_tolerance: u32,
    pub max_verify_attempts: u32,
    pub retry_delay_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            verify_tolerance: 200.0,
            page_tolerance: 1,
            max_verify_attempts: 2,
            retry_delay_ms: 150,
            settle_delay_ms: 100,
        }
    }
}

impl SyncConfig {
    /// Missing file means defaults; a file that does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read config {:?}", path))
            }
        };
        Self::from_toml_str(&contents).with_context(|| format!("failed to parse config {:?}", path))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut config: SyncConfig = toml::from_str(contents)?;
        config.max_verify_attempts = config.max_verify_attempts.max(1);
        Ok(config)
    }
}
