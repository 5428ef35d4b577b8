use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::orchestration::pool::{DEFAULT_HIGH_TIER_CAP, DEFAULT_MAX_CONCURRENCY};
use crate::orchestration::retry::RetryCeilings;
use crate::{Error, Result};

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_high_tier_cap() -> usize {
    DEFAULT_HIGH_TIER_CAP
}

/// Engine configuration, read from `~/.taskwave/taskwave.toml`.
///
/// Every field is optional in the file:
///
/// ```toml
/// max_concurrency = 6
/// attempt_timeout_secs = 900
///
/// [retry]
/// research = 1
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_high_tier_cap")]
    pub high_tier_cap: usize,
    /// Per-attempt limit in seconds. Unset means attempts may run forever.
    pub attempt_timeout_secs: Option<u64>,
    /// Where the run ledger is persisted. `~/` is expanded.
    pub ledger_path: Option<String>,
    #[serde(default)]
    pub retry: RetryCeilings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            high_tier_cap: DEFAULT_HIGH_TIER_CAP,
            attempt_timeout_secs: None,
            ledger_path: None,
            retry: RetryCeilings::default(),
        }
    }
}

impl Config {
    pub fn taskwave_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".taskwave"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::taskwave_dir()?.join("taskwave.toml"))
    }

    /// Resolved ledger location, if persistence is configured.
    pub fn ledger_path(&self) -> Option<PathBuf> {
        self.ledger_path.as_deref().map(expand_tilde)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(
            max_concurrency = config.max_concurrency,
            high_tier_cap = config.high_tier_cap,
            attempt_timeout_secs = ?config.attempt_timeout_secs,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                debug!(dir = %dir.display(), "creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Validation(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.high_tier_cap == 0 {
            return Err(Error::Validation(
                "high_tier_cap must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout_secs == Some(0) {
            return Err(Error::Validation(
                "attempt_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
