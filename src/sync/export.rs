//! Mastery export and import
//!
//! Exports subjects to a JSON bundle and merges bundles from other devices
//! back into a tracker.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::mastery::MasteryTracker;
use crate::sync::{ExportBundle, ExportMetadata, MergeStrategy, BUNDLE_VERSION};

/// Export one subject, or every subject, to `output_path`
///
/// Returns the number of records written.
pub fn export_subjects(tracker: &MasteryTracker, subject: Option<&str>, output_path: &Path) -> Result<usize> {
    let names = match subject {
        Some(name) => vec![name.to_string()],
        None => tracker.subjects(),
    };

    let subjects: BTreeMap<_, _> = names
        .into_iter()
        .map(|name| {
            let words = tracker.subject_items(&name);
            (name, words)
        })
        .filter(|(_, words)| !words.is_empty())
        .collect();

    let item_count: usize = subjects.values().map(|words| words.len()).sum();
    if item_count == 0 {
        return Err(match subject {
            Some(name) => anyhow!("No mastery records to export for subject {}", name),
            None => anyhow!("No mastery records to export"),
        });
    }

    let bundle = ExportBundle {
        metadata: ExportMetadata {
            version: BUNDLE_VERSION.to_string(),
            exported_at: Utc::now().to_rfc3339(),
            subject_count: subjects.len(),
            item_count,
        },
        subjects,
    };

    let json = serde_json::to_string_pretty(&bundle)?;
    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write export to {:?}", output_path))?;

    info!(
        "Exported {} records across {} subjects to {:?}",
        item_count, bundle.metadata.subject_count, output_path
    );
    Ok(item_count)
}

/// Parse a bundle from disk
pub fn read_bundle(input_path: &Path) -> Result<ExportBundle> {
    let content = std::fs::read_to_string(input_path)
        .with_context(|| format!("Failed to read {:?}", input_path))?;
    let bundle: ExportBundle = serde_json::from_str(&content)
        .with_context(|| format!("{:?} is not a mastery export bundle", input_path))?;

    if bundle.metadata.version != BUNDLE_VERSION {
        warn!(
            "Bundle version {} differs from {}; importing anyway",
            bundle.metadata.version, BUNDLE_VERSION
        );
    }
    Ok(bundle)
}

/// Result of import operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    /// Records in the import file
    pub total: usize,
    /// Records added as new
    pub imported: usize,
    /// Existing records overwritten by newer ones
    pub merged: usize,
    /// Records left out in favour of existing data
    pub skipped: usize,
    pub subjects: usize,
    pub exported_at: String,
}

/// Import a bundle file into `tracker`
pub fn import_bundle(tracker: &MasteryTracker, input_path: &Path, strategy: MergeStrategy) -> Result<ImportResult> {
    let bundle = read_bundle(input_path)?;

    info!(
        "Importing {} records across {} subjects (exported at {}) with strategy {}",
        bundle.metadata.item_count, bundle.metadata.subject_count, bundle.metadata.exported_at, strategy
    );

    let mut result = ImportResult {
        total: 0,
        imported: 0,
        merged: 0,
        skipped: 0,
        subjects: bundle.subjects.len(),
        exported_at: bundle.metadata.exported_at,
    };

    for (subject, words) in bundle.subjects {
        result.total += words.len();
        let outcome = tracker.merge_subject(&subject, words, strategy);
        result.imported += outcome.imported;
        result.merged += outcome.merged;
        result.skipped += outcome.skipped;
    }

    Ok(result)
}
