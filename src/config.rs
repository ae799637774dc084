//! Configuration for Kioku
//!
//! `config.toml` in the data directory. Only the retention target is read by
//! the core; it stretches or compresses every review interval.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Days used when no target is configured
pub const DEFAULT_TARGET_DAYS: u32 = 7;

const MIN_RETENTION_SCALE: f64 = 0.2;
const MAX_RETENTION_SCALE: f64 = 10.0;

/// Source of the learner's retention target
pub trait RetentionSource: Send + Sync {
    /// Days until the target, always at least 1
    fn retention_target_days(&self) -> u32;

    /// Interval multiplier derived from the target
    fn retention_scale(&self) -> f64 {
        retention_scale(self.retention_target_days())
    }
}

/// `clamp(days / 7, 0.2, 10.0)`
pub fn retention_scale(days: u32) -> f64 {
    (days as f64 / DEFAULT_TARGET_DAYS as f64).clamp(MIN_RETENTION_SCALE, MAX_RETENTION_SCALE)
}

/// Calendar days from `today` until `target`, floored at 1
pub fn days_until(today: NaiveDate, target: NaiveDate) -> u32 {
    let diff = (target - today).num_days();
    diff.max(1) as u32
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// `[retention]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Flat day count. 0 is treated as the default of 7.
    #[serde(default = "default_target_days")]
    pub target_days: u32,
    /// Exam or study date; takes precedence over `target_days`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
}

fn default_target_days() -> u32 {
    DEFAULT_TARGET_DAYS
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            target_days: DEFAULT_TARGET_DAYS,
            target_date: None,
        }
    }
}

impl RetentionConfig {
    fn days_as_of(&self, today: NaiveDate) -> u32 {
        match self.target_date {
            Some(target) => days_until(today, target),
            None if self.target_days == 0 => DEFAULT_TARGET_DAYS,
            None => self.target_days,
        }
    }
}

impl RetentionSource for RetentionConfig {
    fn retention_target_days(&self) -> u32 {
        self.days_as_of(Local::now().date_naive())
    }
}

/// Fixed day count, for tests and embedders without a config file
#[derive(Debug, Clone, Copy)]
pub struct FixedRetention(pub u32);

impl Default for FixedRetention {
    fn default() -> Self {
        Self(DEFAULT_TARGET_DAYS)
    }
}

impl RetentionSource for FixedRetention {
    fn retention_target_days(&self) -> u32 {
        self.0.max(1)
    }
}

/// Default file written by `kioku init`
pub const DEFAULT_CONFIG: &str = r#"# Kioku Configuration

[retention]
# Days you want to retain words for. Review intervals scale with
# target_days / 7, clamped to 0.2x - 10x.
target_days = 7
# Exam date; overrides target_days when set
# target_date = "2027-01-15"
"#;

/// Load configuration, falling back to defaults when the file is missing
pub fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        debug!("No config at {:?}, using defaults", config_path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Invalid configuration in {:?}", config_path))?;
    Ok(config)
}
