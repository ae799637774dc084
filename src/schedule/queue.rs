//! Review queues built from a vocabulary catalog

use std::cmp::Ordering;
use tracing::debug;

use super::{Reviewable, Scheduler};
use crate::mastery::MasteryLevel;

/// Sort key for one catalog entry, computed once per sort
#[derive(Debug, Clone, Copy)]
struct PriorityKey {
    due: bool,
    due_soon: bool,
    urgency: f64,
    score: f64,
}

impl PriorityKey {
    /// Most urgent first: due, then due soon, then urgency, then score
    fn compare(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.due_soon.cmp(&self.due_soon))
            .then_with(|| other.urgency.partial_cmp(&self.urgency).unwrap_or(Ordering::Equal))
            .then_with(|| self.score.partial_cmp(&other.score).unwrap_or(Ordering::Equal))
    }
}

impl<'a> Scheduler<'a> {
    fn priority_key(&self, subject: &str, word_id: &str) -> PriorityKey {
        let urgency = self.urgency_ratio(subject, word_id);
        PriorityKey {
            due: urgency >= super::DUE_THRESHOLD,
            due_soon: urgency >= super::DUE_SOON_THRESHOLD,
            urgency,
            score: self.priority_score(subject, word_id),
        }
    }

    /// Due words (and due-soon ones when asked), most urgent first
    ///
    /// Words without a record and `New` words are never candidates.
    pub fn review_candidates<'c, V: Reviewable>(
        &self,
        catalog: &'c [V],
        subject: &str,
        include_due_soon: bool,
    ) -> Vec<&'c V> {
        let filtered: Vec<&'c V> = catalog
            .iter()
            .filter(|entry| {
                let word_id = entry.word_id();
                match self.item(subject, word_id) {
                    Some(item) if item.mastery != MasteryLevel::New => {
                        self.is_due(subject, word_id)
                            || (include_due_soon && self.is_due_soon(subject, word_id))
                    }
                    _ => false,
                }
            })
            .collect();

        debug!(
            "{} review candidates for {} out of {} catalog entries",
            filtered.len(),
            subject,
            catalog.len()
        );
        self.sort_by_priority(&filtered, subject)
    }

    /// Stable sort, most urgent first. Ties keep their input order.
    pub fn sort_by_priority<'c, V: Reviewable>(&self, words: &[&'c V], subject: &str) -> Vec<&'c V> {
        let mut keyed: Vec<(PriorityKey, &'c V)> = words
            .iter()
            .map(|entry| (self.priority_key(subject, entry.word_id()), *entry))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| a.compare(b));
        keyed.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Words whose time since last review reached their scaled interval,
    /// lowest mastery level first
    pub fn spaced_repetition_items<'c, V: Reviewable>(&self, catalog: &'c [V], subject: &str) -> Vec<&'c V> {
        let mut due: Vec<(MasteryLevel, &'c V)> = catalog
            .iter()
            .filter_map(|entry| {
                let item = self.item(subject, entry.word_id())?;
                if item.mastery == MasteryLevel::New {
                    return None;
                }
                let interval = item.mastery.base_interval_secs() * self.scale;
                (self.elapsed_secs(item) >= interval).then_some((item.mastery, entry))
            })
            .collect();
        due.sort_by_key(|(level, _)| *level);
        due.into_iter().map(|(_, entry)| entry).collect()
    }

    pub fn due_count<V: Reviewable>(&self, subject: &str, catalog: &[V]) -> usize {
        self.spaced_repetition_items(catalog, subject).len()
    }
}
