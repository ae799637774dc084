//! Sync module for moving mastery data between devices
//!
//! Mastery records travel as a JSON bundle grouped by subject. Importing
//! folds a bundle into a tracker using a [`MergeStrategy`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::mastery::MasteryItem;

pub mod export;

pub use export::{export_subjects, import_bundle, read_bundle, ImportResult};

/// Bundle format version written by this build
pub const BUNDLE_VERSION: &str = "1.0";

/// How imported records combine with existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Add unknown words, leave existing ones untouched (default)
    #[default]
    Add,
    /// Replace the whole subject with the imported records
    Replace,
    /// Keep whichever record was reviewed most recently
    KeepLatest,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::Add => "add",
            MergeStrategy::Replace => "replace",
            MergeStrategy::KeepLatest => "keep-latest",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(MergeStrategy::Add),
            "replace" => Ok(MergeStrategy::Replace),
            "keep-latest" | "keep_latest" | "latest" => Ok(MergeStrategy::KeepLatest),
            other => Err(anyhow::anyhow!(
                "Unknown merge strategy: {} (expected add, replace or keep-latest)",
                other
            )),
        }
    }
}

/// Export metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Export format version
    pub version: String,
    /// Export timestamp (RFC 3339)
    pub exported_at: String,
    pub subject_count: usize,
    /// Records across every subject
    pub item_count: usize,
}

/// Complete export bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub metadata: ExportMetadata,
    /// subject -> word id -> record
    pub subjects: BTreeMap<String, HashMap<String, MasteryItem>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_strategy_default() {
        assert_eq!(MergeStrategy::default(), MergeStrategy::Add);
    }

    #[test]
    fn test_merge_strategy_parse() {
        assert_eq!("replace".parse::<MergeStrategy>().unwrap(), MergeStrategy::Replace);
        assert_eq!("Keep-Latest".parse::<MergeStrategy>().unwrap(), MergeStrategy::KeepLatest);
        assert_eq!(MergeStrategy::KeepLatest.to_string(), "keep-latest");

        let err = "keep-best".parse::<MergeStrategy>().unwrap_err();
        assert!(err.to_string().contains("keep-best"));
    }

    #[test]
    fn test_bundle_json_shape() {
        let mut words = HashMap::new();
        words.insert("e1".to_string(), MasteryItem::new("e1"));
        let mut subjects = BTreeMap::new();
        subjects.insert("english".to_string(), words);

        let bundle = ExportBundle {
            metadata: ExportMetadata {
                version: BUNDLE_VERSION.to_string(),
                exported_at: "2026-10-18T12:00:00+00:00".to_string(),
                subject_count: 1,
                item_count: 1,
            },
            subjects,
        };

        let value = serde_json::to_value(&bundle).unwrap();
        assert_eq!(value["metadata"]["item_count"], 1);
        assert_eq!(value["subjects"]["english"]["e1"]["id"], "e1");
        assert_eq!(value["subjects"]["english"]["e1"]["mastery"], 0);
    }
}
