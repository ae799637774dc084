//! Per-word mastery record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::MasteryLevel;

/// Maximum number of session results kept per word
pub const SESSION_HISTORY_CAP: usize = 20;

/// Proficiency record for one (subject, word) pair
///
/// Only the word id lives on the record; the subject is the key of the
/// outer map owned by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryItem {
    pub id: String,
    pub mastery: MasteryLevel,
    /// Consecutive correct answers within the current level
    pub correct: u32,
    /// Lifetime incorrect answers
    pub wrong: u32,
    /// Run of correct answers under 3 seconds
    pub consecutive_fast: u32,
    /// 0-100 moving average of answer speed
    pub fluency_score: u8,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_chosen_answer_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_correct_answer_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_answer_was_correct: Option<bool>,
    #[serde(default)]
    pub session_history: BTreeMap<i64, SessionResult>,
}

/// Outcome of one answer inside a numbered study session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub correct: bool,
    /// Seconds
    pub response_time: f64,
    pub timestamp: DateTime<Utc>,
}

impl MasteryItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mastery: MasteryLevel::New,
            correct: 0,
            wrong: 0,
            consecutive_fast: 0,
            fluency_score: 0,
            last_seen: Utc::now(),
            last_chosen_answer_text: None,
            last_correct_answer_text: None,
            last_answer_was_correct: None,
            session_history: BTreeMap::new(),
        }
    }

    /// Most recent session result by timestamp
    pub fn latest_session(&self) -> Option<&SessionResult> {
        self.session_history.values().max_by_key(|r| r.timestamp)
    }

    /// Highest session id seen for this word
    pub fn last_session_id(&self) -> Option<i64> {
        self.session_history.keys().next_back().copied()
    }

    /// Record a session result, keeping the highest-numbered ids only.
    ///
    /// Eviction is by ascending session id, not by recency.
    pub(crate) fn record_session(&mut self, session_id: i64, result: SessionResult) {
        self.session_history.insert(session_id, result);
        while self.session_history.len() > SESSION_HISTORY_CAP {
            self.session_history.pop_first();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn result_at(correct: bool, secs_ago: i64) -> SessionResult {
        SessionResult {
            correct,
            response_time: 1.0,
            timestamp: Utc::now() - Duration::seconds(secs_ago),
        }
    }

    #[test]
    fn test_new_item_defaults() {
        let item = MasteryItem::new("w1");
        assert_eq!(item.id, "w1");
        assert_eq!(item.mastery, MasteryLevel::New);
        assert_eq!(item.correct, 0);
        assert_eq!(item.wrong, 0);
        assert_eq!(item.consecutive_fast, 0);
        assert_eq!(item.fluency_score, 0);
        assert!(item.session_history.is_empty());
        assert!(item.last_answer_was_correct.is_none());
    }

    #[test]
    fn test_session_cap_keeps_highest_ids() {
        let mut item = MasteryItem::new("w1");
        // Feed ids out of order to show eviction is by id, not insertion
        for id in (0..25).rev() {
            item.record_session(id, result_at(true, 0));
        }
        assert_eq!(item.session_history.len(), SESSION_HISTORY_CAP);
        let keys: Vec<i64> = item.session_history.keys().copied().collect();
        assert_eq!(keys, (5..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_latest_session_by_timestamp() {
        let mut item = MasteryItem::new("w1");
        item.record_session(9, result_at(true, 600));
        item.record_session(3, result_at(false, 5));

        assert!(!item.latest_session().unwrap().correct);
        assert_eq!(item.last_session_id(), Some(9));
    }

    #[test]
    fn test_serde_roundtrip_keeps_history() {
        let mut item = MasteryItem::new("w1");
        item.mastery = MasteryLevel::Almost;
        item.fluency_score = 72;
        item.last_chosen_answer_text = Some("apple".into());
        item.record_session(42, result_at(true, 10));

        let json = serde_json::to_string(&item).unwrap();
        let back: MasteryItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }
}
