//! Learning statistics for Kioku
//!
//! Aggregate mastery counts pushed after every persisted mutation, per-day
//! study activity, and a file-backed sink the dashboard (`kioku stats`)
//! reads from.

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::mastery::{MasteryItem, MasteryLevel};

/// Stats file inside the data directory
pub const STATS_FILE: &str = "stats.json";

/// Longest streak counted
pub const MAX_STREAK_DAYS: u32 = 365;

const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Aggregate counts across every subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterySnapshot {
    pub total_words: usize,
    pub mastered_count: usize,
    /// Learning + Almost
    pub learning_count: usize,
    /// Percentage mastered, rounded to nearest integer
    pub mastery_rate: u32,
}

impl MasterySnapshot {
    pub fn from_items(items: &HashMap<String, HashMap<String, MasteryItem>>) -> Self {
        let mut snapshot = Self::default();
        for item in items.values().flat_map(|words| words.values()) {
            snapshot.total_words += 1;
            match item.mastery {
                MasteryLevel::Mastered => snapshot.mastered_count += 1,
                MasteryLevel::Learning | MasteryLevel::Almost => snapshot.learning_count += 1,
                _ => {}
            }
        }
        snapshot.mastery_rate = if snapshot.total_words == 0 {
            0
        } else {
            (snapshot.mastered_count as f64 / snapshot.total_words as f64 * 100.0).round() as u32
        };
        snapshot
    }
}

/// Answers recorded for one subject on one local day
#[derive(Debug, Clone, PartialEq)]
pub struct StudyActivity {
    pub day: NaiveDate,
    pub subject: String,
    pub words: u32,
    /// Summed response times
    pub seconds: f64,
}

impl StudyActivity {
    pub fn new(day: NaiveDate, subject: impl Into<String>) -> Self {
        Self {
            day,
            subject: subject.into(),
            words: 0,
            seconds: 0.0,
        }
    }

    pub fn add_answer(&mut self, seconds: f64) {
        self.words += 1;
        self.seconds += seconds;
    }
}

/// Receiver of aggregate snapshots and study activity
pub trait StatsSink: Send {
    fn push(&mut self, snapshot: &MasterySnapshot);

    /// Activity is always followed by a `push` carrying the matching snapshot
    fn record_activity(&mut self, _activity: &StudyActivity) {}
}

/// Sink that discards snapshots
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatsSink for NullSink {
    fn push(&mut self, _snapshot: &MasterySnapshot) {}
}

/// One day of the study history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    pub words: u32,
    #[serde(default)]
    pub seconds: f64,
    /// Words answered per subject
    #[serde(default)]
    pub subjects: BTreeMap<String, u32>,
}

impl DailyEntry {
    pub fn is_active(&self) -> bool {
        self.words > 0 || self.seconds > 0.0
    }

    pub fn minutes(&self) -> u32 {
        (self.seconds / 60.0).round() as u32
    }
}

/// Day history keyed by `YYYY-MM-DD`
pub type DailyHistory = BTreeMap<String, DailyEntry>;

pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_KEY_FORMAT).to_string()
}

/// Consecutive active days ending today
///
/// A day without activity yet does not break the streak until it is over, so
/// counting starts from yesterday when today is still empty.
pub fn study_streak(history: &DailyHistory, today: NaiveDate) -> u32 {
    let active = |day: NaiveDate| history.get(&day_key(day)).is_some_and(DailyEntry::is_active);

    let mut day = if active(today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) => yesterday,
            None => return 0,
        }
    };

    let mut streak = 0;
    while streak < MAX_STREAK_DAYS && active(day) {
        streak += 1;
        match day.pred_opt() {
            Some(previous) => day = previous,
            None => break,
        }
    }
    streak
}

/// Stored form of the dashboard stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredStats {
    #[serde(flatten)]
    pub snapshot: MasterySnapshot,
    /// Streak as of `updated_at`
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub daily_history: DailyHistory,
    pub updated_at: DateTime<Utc>,
}

impl StoredStats {
    pub fn streak_as_of(&self, today: NaiveDate) -> u32 {
        study_streak(&self.daily_history, today)
    }

    pub fn day(&self, day: NaiveDate) -> Option<&DailyEntry> {
        self.daily_history.get(&day_key(day))
    }
}

/// File-backed stats collaborator writing `stats.json`
#[derive(Debug, Clone)]
pub struct LearningStats {
    path: PathBuf,
    current: MasterySnapshot,
    history: DailyHistory,
}

impl LearningStats {
    pub fn new(data_dir: &Path) -> Self {
        let path = data_dir.join(STATS_FILE);
        let (current, history) = match Self::load(&path) {
            Some(stored) => (stored.snapshot, stored.daily_history),
            None => Default::default(),
        };
        Self { path, current, history }
    }

    /// Read the last stored stats, if any
    pub fn load(path: &Path) -> Option<StoredStats> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Ignoring unreadable stats file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn current(&self) -> MasterySnapshot {
        self.current
    }

    pub fn history(&self) -> &DailyHistory {
        &self.history
    }

    fn write(&self) -> Result<()> {
        let stored = StoredStats {
            snapshot: self.current,
            streak: study_streak(&self.history, Local::now().date_naive()),
            daily_history: self.history.clone(),
            updated_at: Utc::now(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }
}

impl StatsSink for LearningStats {
    fn push(&mut self, snapshot: &MasterySnapshot) {
        self.current = *snapshot;
        match self.write() {
            Ok(()) => debug!(
                "Stats updated: {}/{} mastered ({}%)",
                snapshot.mastered_count, snapshot.total_words, snapshot.mastery_rate
            ),
            Err(e) => warn!("Failed to write stats to {:?}: {}", self.path, e),
        }
    }

    fn record_activity(&mut self, activity: &StudyActivity) {
        let entry = self.history.entry(day_key(activity.day)).or_default();
        entry.words += activity.words;
        entry.seconds += activity.seconds;
        if !activity.subject.is_empty() {
            *entry.subjects.entry(activity.subject.clone()).or_insert(0) += activity.words;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(id: &str, mastery: MasteryLevel) -> MasteryItem {
        let mut item = MasteryItem::new(id);
        item.mastery = mastery;
        item
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn active_days(days: &[NaiveDate]) -> DailyHistory {
        days.iter()
            .map(|day| (day_key(*day), DailyEntry { words: 3, ..Default::default() }))
            .collect()
    }

    #[test]
    fn test_snapshot_counts_all_subjects() {
        let mut items: HashMap<String, HashMap<String, MasteryItem>> = HashMap::new();
        let english = items.entry("english".into()).or_default();
        english.insert("a".into(), item("a", MasteryLevel::Mastered));
        english.insert("b".into(), item("b", MasteryLevel::Learning));
        english.insert("c".into(), item("c", MasteryLevel::Weak));
        let kobun = items.entry("kobun".into()).or_default();
        kobun.insert("x".into(), item("x", MasteryLevel::Almost));

        let snapshot = MasterySnapshot::from_items(&items);
        assert_eq!(snapshot.total_words, 4);
        assert_eq!(snapshot.mastered_count, 1);
        assert_eq!(snapshot.learning_count, 2);
        assert_eq!(snapshot.mastery_rate, 25);
    }

    #[test]
    fn test_rate_rounds_to_nearest() {
        let mut items: HashMap<String, HashMap<String, MasteryItem>> = HashMap::new();
        let words = items.entry("english".into()).or_default();
        words.insert("a".into(), item("a", MasteryLevel::Mastered));
        words.insert("b".into(), item("b", MasteryLevel::Mastered));
        words.insert("c".into(), item("c", MasteryLevel::Weak));

        // 2/3 = 66.67%
        assert_eq!(MasterySnapshot::from_items(&items).mastery_rate, 67);
        assert_eq!(MasterySnapshot::from_items(&HashMap::new()).mastery_rate, 0);
    }

    #[test]
    fn test_streak_counts_consecutive_days() {
        let today = date(2026, 10, 18);
        let history = active_days(&[date(2026, 10, 16), date(2026, 10, 17), today]);
        assert_eq!(study_streak(&history, today), 3);
    }

    #[test]
    fn test_streak_survives_until_today_ends() {
        let today = date(2026, 10, 18);
        let history = active_days(&[date(2026, 10, 16), date(2026, 10, 17)]);
        assert_eq!(study_streak(&history, today), 2);

        // Nothing yesterday either
        assert_eq!(study_streak(&history, date(2026, 10, 19)), 0);
    }

    #[test]
    fn test_streak_stops_at_gap() {
        let today = date(2026, 3, 1);
        // Crosses the end of February, then a missed day
        let history = active_days(&[date(2026, 2, 25), date(2026, 2, 27), date(2026, 2, 28), today]);
        assert_eq!(study_streak(&history, today), 3);

        // Entries with no words or time do not count
        let mut idle = history.clone();
        idle.insert(day_key(date(2026, 2, 28)), DailyEntry::default());
        assert_eq!(study_streak(&idle, today), 1);
    }

    #[test]
    fn test_streak_is_capped() {
        let today = date(2026, 10, 18);
        let days: Vec<NaiveDate> = (0..400).map(|n| today - chrono::Duration::days(n)).collect();
        assert_eq!(study_streak(&active_days(&days), today), MAX_STREAK_DAYS);
    }

    #[test]
    fn test_activity_accumulates_per_day_and_subject() {
        let temp = TempDir::new().unwrap();
        let mut stats = LearningStats::new(temp.path());
        let day = date(2026, 10, 18);

        let mut english = StudyActivity::new(day, "english");
        english.add_answer(2.0);
        english.add_answer(4.0);
        let mut kobun = StudyActivity::new(day, "kobun");
        kobun.add_answer(30.0);

        stats.record_activity(&english);
        stats.record_activity(&kobun);
        stats.record_activity(&english);
        stats.push(&MasterySnapshot::default());

        let stored = LearningStats::load(&temp.path().join(STATS_FILE)).unwrap();
        let entry = stored.day(day).unwrap();
        assert_eq!(entry.words, 5);
        assert_eq!(entry.subjects["english"], 4);
        assert_eq!(entry.subjects["kobun"], 1);
        assert_eq!(entry.seconds, 42.0);
        assert_eq!(entry.minutes(), 1);

        // History survives a reopen
        assert_eq!(LearningStats::new(temp.path()).history().len(), 1);
    }

    #[test]
    fn test_learning_stats_writes_file() {
        let temp = TempDir::new().unwrap();
        let mut stats = LearningStats::new(temp.path());
        assert_eq!(stats.current(), MasterySnapshot::default());

        let snapshot = MasterySnapshot {
            total_words: 10,
            mastered_count: 3,
            learning_count: 4,
            mastery_rate: 30,
        };
        stats.push(&snapshot);

        let stored = LearningStats::load(&temp.path().join(STATS_FILE)).unwrap();
        assert_eq!(stored.snapshot, snapshot);
        assert!(stored.daily_history.is_empty());
        assert_eq!(stored.streak, 0);

        // A fresh instance picks up the stored values
        assert_eq!(LearningStats::new(temp.path()).current(), snapshot);
    }

    #[test]
    fn test_reads_stats_without_history() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(STATS_FILE);
        std::fs::write(
            &path,
            r#"{"total_words": 2, "mastered_count": 1, "learning_count": 1, "mastery_rate": 50,
                "updated_at": "2026-10-01T00:00:00Z"}"#,
        )
        .unwrap();

        let stored = LearningStats::load(&path).unwrap();
        assert_eq!(stored.snapshot.mastery_rate, 50);
        assert!(stored.daily_history.is_empty());
    }
}
