//! Command implementations for the `kioku` binary

use anyhow::{Context, Result};
use chrono::{Duration, Local};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use kioku::config::{load_config, DEFAULT_CONFIG};
use kioku::mastery::MASTERY_KEY;
use kioku::stats::{LearningStats, STATS_FILE};
use kioku::storage::SqliteStore;
use kioku::sync::{self, MergeStrategy};
use kioku::{Answer, MasteryLevel, MasteryTracker, Vocabulary};

pub const DB_FILE: &str = "kioku.sqlite";
pub const CONFIG_FILE: &str = "config.toml";
pub const STATE_FILE: &str = "state.json";

/// Counters that outlive a single command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub session_count: i64,
}

impl SessionState {
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(STATE_FILE);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable state file {:?}: {}", path, e);
            Self::default()
        })
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        std::fs::write(data_dir.join(STATE_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Days listed under "Recent days" in `kioku stats`
const RECENT_DAYS: i64 = 7;

/// Open the tracker over the SQLite store in `data_dir`
fn open_tracker(data_dir: &Path) -> Result<MasteryTracker> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let store = SqliteStore::open(&data_dir.join(DB_FILE))
        .with_context(|| format!("Failed to open database in {:?}", data_dir))?;
    let stats = LearningStats::new(data_dir);
    let config = load_config(&data_dir.join(CONFIG_FILE))?;

    MasteryTracker::open(store, stats, Arc::new(config.retention))
}

fn load_catalog(path: &Path) -> Result<Vec<Vocabulary>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {:?}", path))?;
    let catalog: Vec<Vocabulary> = serde_json::from_str(&content)
        .with_context(|| format!("Catalog {:?} is not a JSON array of words", path))?;
    debug!("Loaded {} catalog entries from {:?}", catalog.len(), path);
    Ok(catalog)
}

pub fn init(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    info!("Data directory: {:?}", data_dir);

    SqliteStore::open(&data_dir.join(DB_FILE))?;

    let config_path = data_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        std::fs::write(&config_path, DEFAULT_CONFIG)?;
        info!("Wrote default config to {:?}", config_path);
    }

    if !data_dir.join(STATE_FILE).exists() {
        SessionState::default().save(data_dir)?;
    }

    println!("Kioku initialized at {}", data_dir.display());
    Ok(())
}

pub fn answer(data_dir: &Path, answer: Answer) -> Result<()> {
    let tracker = open_tracker(data_dir)?;
    let mut changes = tracker.subscribe();

    let item = tracker.record_answer(answer);
    tracker.flush();

    if let Ok(change) = changes.try_recv() {
        if change.from != change.to {
            println!("{}/{}: {} -> {}", change.subject, change.word_id, change.from, change.to);
        } else {
            println!("{}/{}: {}", change.subject, change.word_id, change.to);
        }
    }
    println!(
        "  correct streak: {}  wrong: {}  fast streak: {}  fluency: {}",
        item.correct, item.wrong, item.consecutive_fast, item.fluency_score
    );
    Ok(())
}

pub fn status(data_dir: &Path) -> Result<()> {
    println!("Kioku Status");
    println!("============");
    println!();

    if !data_dir.exists() {
        println!("Status: NOT INITIALIZED");
        println!("Run 'kioku init' to initialize Kioku");
        return Ok(());
    }

    println!("Status: INITIALIZED");
    println!("Data directory: {:?}", data_dir);

    let last_saved = SqliteStore::open(&data_dir.join(DB_FILE))?.updated_at(MASTERY_KEY)?;
    let tracker = open_tracker(data_dir)?;
    let state = SessionState::load(data_dir);

    println!(
        "Retention target: {} days (interval scale {:.2}x)",
        tracker.retention_target_days(),
        tracker.retention_scale()
    );
    println!("Sessions started: {}", state.session_count);
    match last_saved {
        Some(at) => println!("Last saved: {} UTC", at),
        None => println!("Last saved: never"),
    }
    println!();

    let subjects = tracker.subjects();
    if subjects.is_empty() {
        println!("No answers recorded yet.");
        return Ok(());
    }

    println!("Subjects:");
    for subject in subjects {
        let count: usize = tracker.get_stats(&subject).values().sum();
        println!("  {:<16} {} words", subject, count);
    }
    Ok(())
}

pub fn stats(data_dir: &Path, subject: Option<&str>) -> Result<()> {
    let tracker = open_tracker(data_dir)?;

    let (title, counts) = match subject {
        Some(subject) => (format!("Mastery for {}", subject), tracker.get_stats(subject)),
        None => ("Mastery (all subjects)".to_string(), tracker.overall_stats()),
    };

    println!("{}", title);
    println!("{}", "-".repeat(title.len()));
    let total: usize = counts.values().sum();
    for level in MasteryLevel::ALL {
        let count = counts.get(&level).copied().unwrap_or(0);
        println!("  {:<10} {}", level.label(), count);
    }
    println!("  {:<10} {}", "Total", total);
    println!();

    let snapshot = tracker.snapshot();
    println!("Dashboard:");
    println!("  Words tracked: {}", snapshot.total_words);
    println!("  Mastered: {}", snapshot.mastered_count);
    println!("  In progress: {}", snapshot.learning_count);
    println!("  Mastery rate: {}%", snapshot.mastery_rate);

    // Opening the tracker above rewrote stats.json with the current counts
    drop(tracker);
    let Some(stored) = LearningStats::load(&data_dir.join(STATS_FILE)) else {
        return Ok(());
    };

    let today = Local::now().date_naive();
    println!("  Streak: {} days", stored.streak_as_of(today));
    println!();
    println!("Recent days:");
    for offset in 0..RECENT_DAYS {
        let day = today - Duration::days(offset);
        let Some(entry) = stored.day(day).filter(|entry| entry.is_active()) else {
            continue;
        };
        let words = match subject {
            Some(subject) => entry.subjects.get(subject).copied().unwrap_or(0),
            None => entry.words,
        };
        println!("  {}  {:>4} words  {:>3} min", day, words, entry.minutes());
    }
    Ok(())
}

pub fn review(
    data_dir: &Path,
    subject: &str,
    catalog_path: &Path,
    include_due_soon: bool,
    limit: Option<usize>,
) -> Result<()> {
    let tracker = open_tracker(data_dir)?;
    let catalog = load_catalog(catalog_path)?;

    tracker.with_scheduler(|s| {
        let mut queue = s.review_candidates(&catalog, subject, include_due_soon);
        if let Some(limit) = limit {
            queue.truncate(limit);
        }

        if queue.is_empty() {
            println!("Nothing to review for {}", subject);
            return;
        }

        println!("{} words to review for {}:", queue.len(), subject);
        for word in queue {
            let level = s.item(subject, &word.id).map(|item| item.mastery).unwrap_or_default();
            println!(
                "  {:<12} {:<20} {:<9} urgency {:.2}",
                word.id,
                word.term,
                level.label(),
                s.urgency_ratio(subject, &word.id)
            );
        }
    });
    Ok(())
}

pub fn due(data_dir: &Path, subject: &str, catalog_path: &Path, count_only: bool) -> Result<()> {
    let tracker = open_tracker(data_dir)?;
    let catalog = load_catalog(catalog_path)?;

    if count_only {
        println!("{}", tracker.due_count(subject, &catalog));
        return Ok(());
    }

    let due = tracker.spaced_repetition_items(&catalog, subject);
    println!("{} words due for {}", due.len(), subject);
    for word in due {
        println!("  {:<12} {:<9} {}", word.id, tracker.get_mastery(subject, &word.id).label(), word.term);
    }
    Ok(())
}

pub fn weak(data_dir: &Path, subject: &str) -> Result<()> {
    let tracker = open_tracker(data_dir)?;
    let weak = tracker.weak_words(subject);

    if weak.is_empty() {
        println!("No weak words for {}", subject);
        return Ok(());
    }
    for word_id in weak {
        println!("{}", word_id);
    }
    Ok(())
}

pub fn quiz(data_dir: &Path, subject: &str, catalog_path: &Path, count: usize, next_session: bool) -> Result<()> {
    let tracker = open_tracker(data_dir)?;
    let catalog = load_catalog(catalog_path)?;

    let mut state = SessionState::load(data_dir);
    if next_session || state.session_count == 0 {
        state.session_count += 1;
        state.save(data_dir)?;
    }

    let mut rng = rand::thread_rng();
    let questions = tracker.select_questions(&catalog, count, subject, state.session_count, &mut rng);

    println!("Session {}: {} questions", state.session_count, questions.len());
    for word in questions {
        match &word.hint {
            Some(hint) => println!("  {:<12} {} ({})", word.id, word.term, hint),
            None => println!("  {:<12} {}", word.id, word.term),
        }
    }
    Ok(())
}

pub fn export(data_dir: &Path, output: &Path, subject: Option<&str>) -> Result<()> {
    let tracker = open_tracker(data_dir)?;
    let count = sync::export_subjects(&tracker, subject, output)?;
    println!("Exported {} records to {}", count, output.display());
    Ok(())
}

pub fn import(data_dir: &Path, input: &Path, merge: MergeStrategy) -> Result<()> {
    let tracker = open_tracker(data_dir)?;
    let result = sync::import_bundle(&tracker, input, merge)?;
    tracker.flush();

    println!("Import complete (exported at {})", result.exported_at);
    println!("   Subjects: {}", result.subjects);
    println!("   Total records: {}", result.total);
    println!("   New records: {}", result.imported);
    println!("   Merged: {}", result.merged);
    if result.skipped > 0 {
        println!("   Skipped: {}", result.skipped);
    }
    Ok(())
}
