//! Kioku - vocabulary mastery tracking and spaced-repetition scheduling
//!
//! The core is [`mastery::MasteryTracker`], which scores answer events and
//! owns the per-word proficiency records, and the [`schedule`] module, which
//! reads those records to build review queues.

use anyhow::Result;
use std::path::PathBuf;

pub mod config;
pub mod mastery;
pub mod schedule;
pub mod stats;
pub mod storage;
pub mod sync;

pub use config::{FixedRetention, RetentionConfig, RetentionSource};
pub use mastery::{Answer, MasteryChange, MasteryItem, MasteryLevel, MasteryTracker, SessionResult};
pub use schedule::{Reviewable, Scheduler, Vocabulary};
pub use stats::{LearningStats, MasterySnapshot, StatsSink, StudyActivity};
pub use storage::{MemoryStore, Persistence, SqliteStore, StoreError};

/// Environment variable overriding the data directory
pub const DIR_ENV: &str = "KIOKU_DIR";

/// Resolve the data directory
///
/// `$KIOKU_DIR` wins, then a `.kioku` directory in the current project,
/// then `~/.kioku`.
pub fn get_kioku_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    // Check for .kioku directory in current project first
    let cwd = std::env::current_dir()?;
    let project_dir = cwd.join(".kioku");
    if project_dir.exists() {
        return Ok(project_dir);
    }

    // Fall back to home directory
    let home = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(".kioku"))
}
