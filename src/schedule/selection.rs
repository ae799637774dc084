//! Quiz question selection driven by per-session history
//!
//! Words answered correctly and quickly in a recent session sit out; words
//! answered correctly but slowly come back after skipping one session;
//! everything else is asked right away.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

use super::Reviewable;
use crate::mastery::{ItemMap, MasteryItem, MasteryLevel};

/// Correct answers faster than this keep a word out of the next quiz
pub const QUICK_ANSWER_SECS: f64 = 5.0;

/// Sessions a slow-but-correct word waits before returning
pub const DELAY_SESSIONS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Immediate,
    Delayed,
    Excluded,
}

fn classify(item: Option<&MasteryItem>, current_session: i64) -> Group {
    let Some(item) = item else {
        return Group::Immediate;
    };
    let Some(latest) = item.latest_session() else {
        return Group::Immediate;
    };

    if !latest.correct {
        return Group::Immediate;
    }
    if latest.response_time < QUICK_ANSWER_SECS {
        return Group::Excluded;
    }

    match item.last_session_id() {
        Some(last) if current_session >= last + DELAY_SESSIONS => Group::Delayed,
        _ => Group::Excluded,
    }
}

fn shuffle_by_priority<V: Reviewable, R: Rng + ?Sized>(
    group: &mut Vec<&V>,
    words: Option<&HashMap<String, MasteryItem>>,
    rng: &mut R,
) {
    group.shuffle(rng);
    group.sort_by_key(|entry| {
        words
            .and_then(|w| w.get(entry.word_id()))
            .map(|item| item.mastery)
            .unwrap_or(MasteryLevel::New)
            .base_priority()
    });
}

/// Pick up to `count` questions for `current_session`
///
/// Fresh and recently missed words come first, then slow-but-correct words
/// whose delay has passed. Short results are topped up from the excluded
/// words so a quiz is never empty while the catalog has entries.
pub fn select_questions_with_history<'c, V, R>(
    items: &ItemMap,
    catalog: &'c [V],
    count: usize,
    subject: &str,
    current_session: i64,
    rng: &mut R,
) -> Vec<&'c V>
where
    V: Reviewable,
    R: Rng + ?Sized,
{
    let words = items.get(subject);

    let mut immediate = Vec::new();
    let mut delayed = Vec::new();
    let mut excluded = Vec::new();

    for entry in catalog {
        let item = words.and_then(|w| w.get(entry.word_id()));
        match classify(item, current_session) {
            Group::Immediate => immediate.push(entry),
            Group::Delayed => delayed.push(entry),
            Group::Excluded => excluded.push(entry),
        }
    }

    debug!(
        "Session {} selection for {}: {} immediate, {} delayed, {} excluded",
        current_session,
        subject,
        immediate.len(),
        delayed.len(),
        excluded.len()
    );

    shuffle_by_priority(&mut immediate, words, rng);
    shuffle_by_priority(&mut delayed, words, rng);
    shuffle_by_priority(&mut excluded, words, rng);

    let mut selected = immediate;
    selected.append(&mut delayed);

    if selected.is_empty() {
        selected = excluded;
    } else if selected.len() < count {
        for entry in excluded {
            if selected.len() >= count {
                break;
            }
            if !selected.iter().any(|s| s.word_id() == entry.word_id()) {
                selected.push(entry);
            }
        }
    }

    selected.truncate(count);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mastery::SessionResult;
    use crate::schedule::test_support::{items, now, seen};
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn answered(id: &str, mastery: MasteryLevel, session: i64, correct: bool, seconds: f64) -> MasteryItem {
        let mut item = seen(id, mastery, 1.0);
        item.session_history.insert(
            session,
            SessionResult {
                correct,
                response_time: seconds,
                timestamp: now() - Duration::hours(1),
            },
        );
        item
    }

    fn ids(entries: &[&&str]) -> Vec<String> {
        entries.iter().map(|e| e.to_string()).collect()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_groups_by_latest_result() {
        let map = items(
            "english",
            vec![
                answered("quick", MasteryLevel::Learning, 3, true, 1.0),
                answered("slow", MasteryLevel::Learning, 3, true, 6.0),
                answered("missed", MasteryLevel::Weak, 3, false, 1.0),
                seen("no_history", MasteryLevel::Almost, 2.0),
            ],
        );
        let catalog = ["quick", "slow", "missed", "no_history", "unseen"];

        // Session 4: slow word still waiting, quick word excluded
        let picked = select_questions_with_history(&map, &catalog, 3, "english", 4, &mut rng());
        assert_eq!(ids(&picked), vec!["missed", "unseen", "no_history"]);

        // Session 5: the slow word is back, after the immediate group
        let picked = select_questions_with_history(&map, &catalog, 10, "english", 5, &mut rng());
        assert_eq!(ids(&picked), vec!["missed", "unseen", "no_history", "slow", "quick"]);
    }

    #[test]
    fn test_backfills_from_excluded() {
        let map = items(
            "english",
            vec![
                answered("a", MasteryLevel::Mastered, 1, true, 1.0),
                answered("b", MasteryLevel::Weak, 1, true, 1.0),
                answered("c", MasteryLevel::Weak, 1, false, 1.0),
            ],
        );
        let catalog = ["a", "b", "c"];

        let picked = select_questions_with_history(&map, &catalog, 2, "english", 2, &mut rng());
        assert_eq!(ids(&picked), vec!["c", "b"]);
    }

    #[test]
    fn test_all_excluded_falls_back() {
        let map = items(
            "english",
            vec![
                answered("a", MasteryLevel::Almost, 9, true, 0.5),
                answered("b", MasteryLevel::Learning, 9, true, 6.0),
            ],
        );
        let catalog = ["a", "b"];

        let picked = select_questions_with_history(&map, &catalog, 5, "english", 10, &mut rng());
        assert_eq!(ids(&picked), vec!["b", "a"]);
    }

    #[test]
    fn test_uses_latest_timestamp_not_highest_session() {
        let mut item = seen("w", MasteryLevel::Learning, 1.0);
        item.session_history.insert(
            8,
            SessionResult { correct: true, response_time: 1.0, timestamp: now() - Duration::hours(3) },
        );
        item.session_history.insert(
            5,
            SessionResult { correct: false, response_time: 1.0, timestamp: now() - Duration::hours(1) },
        );
        let map = items("english", vec![item, answered("x", MasteryLevel::Weak, 8, true, 1.0)]);
        let catalog = ["x", "w"];

        let picked = select_questions_with_history(&map, &catalog, 1, "english", 9, &mut rng());
        assert_eq!(ids(&picked), vec!["w"]);
    }

    #[test]
    fn test_truncates_and_handles_empty() {
        let map = ItemMap::new();
        let catalog: [&str; 0] = [];
        assert!(select_questions_with_history(&map, &catalog, 5, "english", 1, &mut rng()).is_empty());

        let catalog = ["a", "b", "c", "d"];
        let picked = select_questions_with_history(&map, &catalog, 2, "english", 1, &mut rng());
        assert_eq!(picked.len(), 2);
        assert!(select_questions_with_history(&map, &catalog, 0, "english", 1, &mut rng()).is_empty());
    }
}
