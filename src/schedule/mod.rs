//! Spaced-repetition scheduling
//!
//! Read-only views over the tracker's records: how overdue a word is, how
//! much it has likely been forgotten, and which words to review next.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mastery::{ItemMap, MasteryItem, MasteryLevel};

mod queue;
pub mod selection;

pub use selection::select_questions_with_history;

/// Urgency at which a word is due
pub const DUE_THRESHOLD: f64 = 1.0;

/// Urgency at which a word is due soon
pub const DUE_SOON_THRESHOLD: f64 = 0.8;

/// Anything in a vocabulary catalog that maps to a word id
pub trait Reviewable {
    fn word_id(&self) -> &str;
}

impl Reviewable for String {
    fn word_id(&self) -> &str {
        self
    }
}

impl Reviewable for str {
    fn word_id(&self) -> &str {
        self
    }
}

impl<T: Reviewable + ?Sized> Reviewable for &T {
    fn word_id(&self) -> &str {
        (**self).word_id()
    }
}

/// A catalog entry as shipped in vocabulary files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub id: String,
    pub term: String,
    #[serde(default)]
    pub meaning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Vocabulary {
    pub fn new(id: impl Into<String>, term: impl Into<String>, meaning: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            term: term.into(),
            meaning: meaning.into(),
            reading: None,
            hint: None,
        }
    }
}

impl Reviewable for Vocabulary {
    fn word_id(&self) -> &str {
        &self.id
    }
}

/// Scheduling queries against one consistent view of the records
#[derive(Debug, Clone, Copy)]
pub struct Scheduler<'a> {
    items: &'a ItemMap,
    scale: f64,
    now: DateTime<Utc>,
}

impl<'a> Scheduler<'a> {
    pub fn new(items: &'a ItemMap, retention_scale: f64) -> Self {
        Self {
            items,
            scale: retention_scale,
            now: Utc::now(),
        }
    }

    /// Evaluate as of a fixed instant
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn retention_scale(&self) -> f64 {
        self.scale
    }

    pub fn item(&self, subject: &str, word_id: &str) -> Option<&'a MasteryItem> {
        self.items.get(subject)?.get(word_id)
    }

    /// Scaled review interval in seconds; `None` for missing or New words
    pub fn interval_secs(&self, subject: &str, word_id: &str) -> Option<f64> {
        let item = self.item(subject, word_id)?;
        if item.mastery == MasteryLevel::New {
            return None;
        }
        Some(item.mastery.base_interval_secs() * self.scale)
    }

    fn elapsed_secs(&self, item: &MasteryItem) -> f64 {
        (self.now - item.last_seen).num_milliseconds() as f64 / 1000.0
    }

    /// Elapsed time since last review over the scaled interval
    pub fn urgency_ratio(&self, subject: &str, word_id: &str) -> f64 {
        let (Some(item), Some(interval)) = (self.item(subject, word_id), self.interval_secs(subject, word_id)) else {
            return 0.0;
        };
        if interval <= 0.0 {
            return 0.0;
        }
        self.elapsed_secs(item) / interval
    }

    pub fn is_due(&self, subject: &str, word_id: &str) -> bool {
        self.urgency_ratio(subject, word_id) >= DUE_THRESHOLD
    }

    pub fn is_due_soon(&self, subject: &str, word_id: &str) -> bool {
        self.urgency_ratio(subject, word_id) >= DUE_SOON_THRESHOLD
    }

    /// Extra priority for words idle well past their interval
    pub fn forget_boost(&self, subject: &str, word_id: &str) -> f64 {
        let Some(item) = self.item(subject, word_id) else {
            return 0.0;
        };
        let hours = self.elapsed_secs(item) / 3600.0;
        let scale = self.scale;

        match item.mastery {
            MasteryLevel::Mastered => {
                if hours >= 24.0 * 14.0 * scale {
                    0.5
                } else if hours >= 24.0 * 7.0 * scale {
                    0.4
                } else if hours >= 24.0 * 3.0 * scale {
                    0.2
                } else {
                    0.0
                }
            }
            MasteryLevel::Almost | MasteryLevel::Learning => {
                if hours >= 24.0 * 3.0 * scale {
                    0.8
                } else if hours >= 24.0 * scale {
                    0.5
                } else if hours >= 12.0 * scale {
                    0.3
                } else {
                    0.0
                }
            }
            MasteryLevel::New | MasteryLevel::Weak => 0.0,
        }
    }

    /// `base_priority - forget_boost`; lower is reviewed first
    pub fn priority_score(&self, subject: &str, word_id: &str) -> f64 {
        let level = self.item(subject, word_id).map(|item| item.mastery).unwrap_or_default();
        level.base_priority() as f64 - self.forget_boost(subject, word_id)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::Duration;

    pub fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    pub fn seen(id: &str, mastery: MasteryLevel, hours_ago: f64) -> MasteryItem {
        let mut item = MasteryItem::new(id);
        item.mastery = mastery;
        item.last_seen = now() - Duration::milliseconds((hours_ago * 3_600_000.0) as i64);
        item
    }

    pub fn items(subject: &str, records: Vec<MasteryItem>) -> ItemMap {
        let mut map = ItemMap::new();
        let words = map.entry(subject.to_string()).or_default();
        for item in records {
            words.insert(item.id.clone(), item);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_urgency_scales_with_retention() {
        let map = items("english", vec![seen("a", MasteryLevel::Almost, 12.0)]);

        let normal = Scheduler::new(&map, 1.0).at(now());
        assert!((normal.urgency_ratio("english", "a") - 0.5).abs() < 1e-9);

        let stretched = Scheduler::new(&map, 2.0).at(now());
        assert!((stretched.urgency_ratio("english", "a") - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_new_and_missing_words_have_no_urgency() {
        let map = items("english", vec![seen("n", MasteryLevel::New, 1000.0)]);
        let s = Scheduler::new(&map, 1.0).at(now());

        assert_eq!(s.urgency_ratio("english", "n"), 0.0);
        assert_eq!(s.urgency_ratio("english", "missing"), 0.0);
        assert_eq!(s.urgency_ratio("kobun", "n"), 0.0);
        assert!(s.interval_secs("english", "n").is_none());
        assert!(!s.is_due("english", "n"));
    }

    #[test]
    fn test_almost_overdue_is_due() {
        let map = items("english", vec![seen("a", MasteryLevel::Almost, 25.0)]);
        let s = Scheduler::new(&map, 1.0).at(now());

        assert!(s.is_due_soon("english", "a"));
        assert!(s.is_due("english", "a"));
        assert!((s.urgency_ratio("english", "a") - 25.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_due_soon_window() {
        // Weak interval is 1h; 50 minutes is 83%
        let map = items("english", vec![seen("w", MasteryLevel::Weak, 50.0 / 60.0)]);
        let s = Scheduler::new(&map, 1.0).at(now());
        assert!(s.is_due_soon("english", "w"));
        assert!(!s.is_due("english", "w"));
    }

    #[test]
    fn test_forget_boost_tiers() {
        let map = items(
            "english",
            vec![
                seen("m3", MasteryLevel::Mastered, 24.0 * 3.0),
                seen("m7", MasteryLevel::Mastered, 24.0 * 7.0),
                seen("m14", MasteryLevel::Mastered, 24.0 * 14.0),
                seen("m1", MasteryLevel::Mastered, 24.0),
                seen("l12", MasteryLevel::Learning, 12.0),
                seen("a24", MasteryLevel::Almost, 24.0),
                seen("a72", MasteryLevel::Almost, 72.0),
                seen("w", MasteryLevel::Weak, 500.0),
            ],
        );
        let s = Scheduler::new(&map, 1.0).at(now());

        assert_eq!(s.forget_boost("english", "m1"), 0.0);
        assert_eq!(s.forget_boost("english", "m3"), 0.2);
        assert_eq!(s.forget_boost("english", "m7"), 0.4);
        assert_eq!(s.forget_boost("english", "m14"), 0.5);
        assert_eq!(s.forget_boost("english", "l12"), 0.3);
        assert_eq!(s.forget_boost("english", "a24"), 0.5);
        assert_eq!(s.forget_boost("english", "a72"), 0.8);
        assert_eq!(s.forget_boost("english", "w"), 0.0);

        // Doubling the scale pushes every tier out
        let relaxed = Scheduler::new(&map, 2.0).at(now());
        assert_eq!(relaxed.forget_boost("english", "a24"), 0.3);
        assert_eq!(relaxed.forget_boost("english", "m7"), 0.2);
    }

    #[test]
    fn test_priority_score() {
        let map = items("english", vec![seen("a", MasteryLevel::Almost, 72.0)]);
        let s = Scheduler::new(&map, 1.0).at(now());
        assert!((s.priority_score("english", "a") - 2.2).abs() < 1e-9);
        // Unknown words rank as New
        assert_eq!(s.priority_score("english", "missing"), 1.0);
    }

    #[test]
    fn test_vocabulary_json() {
        let json = r#"[{"id":"e1","term":"apple","meaning":"りんご"},{"id":"e2","term":"abandon"}]"#;
        let catalog: Vec<Vocabulary> = serde_json::from_str(json).unwrap();
        assert_eq!(catalog[0].word_id(), "e1");
        assert_eq!(catalog[1].meaning, "");
    }
}
