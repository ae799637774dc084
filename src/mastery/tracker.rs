//! Mastery tracker - the answer-scoring state machine
//!
//! Owns every [`MasteryItem`], keyed by subject then word id. Mutations hold
//! the write lock for the whole update and then mark the collection dirty.
//! A background writer saves the newest state, so persistence never blocks
//! the caller and a slow store only ever lags by one snapshot.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use parking_lot::{Condvar, Mutex, RwLock};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{MasteryItem, MasteryLevel, SessionResult};
use crate::config::RetentionSource;
use crate::schedule::{select_questions_with_history, Reviewable, Scheduler};
use crate::stats::{MasterySnapshot, NullSink, StatsSink, StudyActivity};
use crate::storage::{MemoryStore, Persistence};
use crate::sync::MergeStrategy;

/// Persistence key of the full collection
pub const MASTERY_KEY: &str = "mastery_v2";

/// subject -> word id -> record
pub type ItemMap = HashMap<String, HashMap<String, MasteryItem>>;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Seconds under which a correct answer extends the fast streak
const FAST_STREAK_LIMIT: f64 = 3.0;

/// Fluency score at or above which Almost words may skip ahead
const HIGH_FLUENCY: u8 = 80;

/// One answer event
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub subject: String,
    pub word_id: String,
    pub is_correct: bool,
    /// Seconds taken to answer
    pub response_time: f64,
    /// Blanks in the question; more blanks relax the speed thresholds
    pub blank_count: u32,
    pub session_id: Option<i64>,
    pub chosen_answer_text: Option<String>,
    pub correct_answer_text: Option<String>,
}

impl Answer {
    pub fn new(subject: impl Into<String>, word_id: impl Into<String>, is_correct: bool) -> Self {
        Self {
            subject: subject.into(),
            word_id: word_id.into(),
            is_correct,
            response_time: 2.0,
            blank_count: 1,
            session_id: None,
            chosen_answer_text: None,
            correct_answer_text: None,
        }
    }

    pub fn with_response_time(mut self, seconds: f64) -> Self {
        self.response_time = seconds;
        self
    }

    pub fn with_blank_count(mut self, blanks: u32) -> Self {
        self.blank_count = blanks;
        self
    }

    pub fn with_session(mut self, session_id: i64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_answer_texts(mut self, chosen: Option<String>, correct: Option<String>) -> Self {
        self.chosen_answer_text = chosen;
        self.correct_answer_text = correct;
        self
    }

    /// Negative (or NaN) times count as instant
    fn seconds(&self) -> f64 {
        if self.response_time > 0.0 {
            self.response_time
        } else {
            0.0
        }
    }

    fn blanks(&self) -> u32 {
        self.blank_count.max(1)
    }
}

/// Published after every recorded answer
#[derive(Debug, Clone, PartialEq)]
pub struct MasteryChange {
    pub subject: String,
    pub word_id: String,
    pub from: MasteryLevel,
    pub to: MasteryLevel,
    pub was_correct: bool,
    pub fluency_score: u8,
}

/// Counts from [`MasteryTracker::merge_subject`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub imported: usize,
    pub merged: usize,
    pub skipped: usize,
}

/// Speed thresholds for a question with `blanks` blanks
#[derive(Debug, Clone, Copy)]
struct SpeedLimits {
    fast: f64,
    very_fast: f64,
    slow: f64,
}

impl SpeedLimits {
    fn for_blanks(blanks: u32) -> Self {
        let extra = (blanks.max(1) - 1) as f64;
        Self {
            fast: 3.0 + extra * 1.5,
            very_fast: 1.5 + extra * 1.0,
            slow: 8.0 + extra * 3.0,
        }
    }
}

/// Fluency sample for a correct answer
fn fluency_gain(seconds: f64) -> f64 {
    if seconds >= 10.0 {
        10.0
    } else if seconds >= 5.0 {
        40.0
    } else if seconds >= 2.0 {
        70.0
    } else {
        100.0
    }
}

/// Apply one answer to a record. Pure except for the timestamp passed in.
fn score_answer(item: &mut MasteryItem, answer: &Answer, now: chrono::DateTime<Utc>) {
    let seconds = answer.seconds();

    item.last_seen = now;
    item.last_chosen_answer_text = answer.chosen_answer_text.clone();
    item.last_correct_answer_text = answer.correct_answer_text.clone();
    item.last_answer_was_correct = Some(answer.is_correct);

    if let Some(session_id) = answer.session_id {
        item.record_session(
            session_id,
            SessionResult {
                correct: answer.is_correct,
                response_time: seconds,
                timestamp: now,
            },
        );
    }

    if !answer.is_correct {
        item.wrong += 1;
        item.correct = 0;
        item.consecutive_fast = 0;
        item.mastery = item.mastery.demoted();
        item.fluency_score = item.fluency_score.saturating_sub(20);
        return;
    }

    // Moving average, new sample weighted 0.4
    let blended = item.fluency_score as f64 * 0.6 + fluency_gain(seconds) * 0.4;
    item.fluency_score = blended.round().clamp(0.0, 100.0) as u8;

    if seconds < FAST_STREAK_LIMIT {
        item.consecutive_fast += 1;
    } else {
        item.consecutive_fast = 0;
    }

    let limits = SpeedLimits::for_blanks(answer.blanks());
    let is_fast = seconds < limits.fast;
    let is_very_fast = seconds < limits.very_fast;
    let is_slow = seconds > limits.slow;
    let high_fluency = item.fluency_score >= HIGH_FLUENCY;

    item.correct += 1;

    let promoted = match item.mastery {
        MasteryLevel::New => Some(MasteryLevel::Learning),
        MasteryLevel::Weak => (item.correct >= 2).then_some(MasteryLevel::Learning),
        MasteryLevel::Learning => {
            let required = if is_fast {
                1
            } else if is_slow {
                4
            } else {
                2
            };
            (item.correct >= required).then_some(MasteryLevel::Almost)
        }
        MasteryLevel::Almost => {
            let required = if is_fast {
                2
            } else if is_slow {
                6
            } else {
                4
            };
            let instant = is_very_fast && item.consecutive_fast >= 3;
            let fluent = high_fluency && item.correct >= 2;
            (instant || fluent || item.correct >= required).then_some(MasteryLevel::Mastered)
        }
        MasteryLevel::Mastered => None,
    };

    if let Some(next) = promoted {
        item.mastery = next;
        item.correct = 0;
    }
}

/// Pending work shared between the tracker and its writer
#[derive(Default)]
struct WriteState {
    /// Bumped on every mutation
    requested: u64,
    /// Highest generation the writer has saved
    saved: u64,
    activity: HashMap<(NaiveDate, String), StudyActivity>,
    closed: bool,
    stopped: bool,
}

#[derive(Default)]
struct WriteQueue {
    state: Mutex<WriteState>,
    changed: Condvar,
}

impl WriteQueue {
    fn mark_dirty(&self, activity: Option<(&str, f64)>) {
        let mut state = self.state.lock();
        state.requested += 1;
        if let Some((subject, seconds)) = activity {
            let day = Local::now().date_naive();
            state
                .activity
                .entry((day, subject.to_string()))
                .or_insert_with(|| StudyActivity::new(day, subject))
                .add_answer(seconds);
        }
        self.changed.notify_all();
    }
}

/// Marks the queue stopped when the writer exits, panics included
struct StopGuard<'a>(&'a WriteQueue);

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.0.state.lock().stopped = true;
        self.0.changed.notify_all();
    }
}

/// Background writer owning the collaborators
struct Writer {
    queue: Arc<WriteQueue>,
    handle: JoinHandle<()>,
}

/// Save the newest collection whenever it changes
///
/// Bursts of mutations collapse into one save of the latest state, so the
/// backlog never grows past a single snapshot.
fn run_writer<P: Persistence, S: StatsSink>(
    mut store: P,
    mut sink: S,
    items: Arc<RwLock<ItemMap>>,
    queue: Arc<WriteQueue>,
) {
    let _guard = StopGuard(&queue);

    loop {
        let (target, activity) = {
            let mut state = queue.state.lock();
            while state.requested == state.saved && !state.closed {
                queue.changed.wait(&mut state);
            }
            if state.requested == state.saved {
                break;
            }
            (state.requested, std::mem::take(&mut state.activity))
        };

        // Clone under the read guard, encode without it
        let collection = items.read().clone();
        let snapshot = MasterySnapshot::from_items(&collection);
        match serde_json::to_vec(&collection) {
            Ok(bytes) => {
                if let Err(e) = store.save(MASTERY_KEY, &bytes) {
                    warn!("Failed to persist mastery data: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode mastery data: {}", e),
        }
        for entry in activity.values() {
            sink.record_activity(entry);
        }
        sink.push(&snapshot);

        let mut state = queue.state.lock();
        state.saved = target;
        queue.changed.notify_all();
    }
    debug!("Mastery writer stopped");
}

/// Decode a stored collection. Corrupt data yields an empty collection.
fn decode_items(bytes: &[u8]) -> ItemMap {
    match serde_json::from_slice::<ItemMap>(bytes) {
        Ok(mut items) => {
            // Records carry their own id; keep it in step with the map key
            for words in items.values_mut() {
                for (word_id, item) in words.iter_mut() {
                    if item.id != *word_id {
                        item.id = word_id.clone();
                    }
                }
            }
            items
        }
        Err(e) => {
            warn!("Discarding unreadable mastery data: {}", e);
            ItemMap::new()
        }
    }
}

/// Owner of all mastery records
pub struct MasteryTracker {
    items: Arc<RwLock<ItemMap>>,
    retention: Arc<dyn RetentionSource>,
    changes: broadcast::Sender<MasteryChange>,
    writer: Option<Writer>,
}

impl MasteryTracker {
    /// Load the collection from `store` and start the background writer
    pub fn open<P, S>(store: P, mut sink: S, retention: Arc<dyn RetentionSource>) -> Result<Self>
    where
        P: Persistence + 'static,
        S: StatsSink + 'static,
    {
        let items = match store.load(MASTERY_KEY) {
            Ok(Some(bytes)) => decode_items(&bytes),
            Ok(None) => ItemMap::new(),
            Err(e) => {
                warn!("Failed to load mastery data, starting empty: {}", e);
                ItemMap::new()
            }
        };

        let word_count: usize = items.values().map(HashMap::len).sum();
        info!("Loaded {} mastery records across {} subjects", word_count, items.len());

        sink.push(&MasterySnapshot::from_items(&items));

        let items = Arc::new(RwLock::new(items));
        let queue = Arc::new(WriteQueue::default());
        let handle = {
            let items = Arc::clone(&items);
            let queue = Arc::clone(&queue);
            std::thread::Builder::new()
                .name("kioku-writer".into())
                .spawn(move || run_writer(store, sink, items, queue))
                .context("Failed to spawn mastery writer")?
        };

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            items,
            retention,
            changes,
            writer: Some(Writer { queue, handle }),
        })
    }

    /// Tracker with in-memory storage and no stats sink
    pub fn in_memory(retention: Arc<dyn RetentionSource>) -> Result<Self> {
        Self::open(MemoryStore::new(), NullSink, retention)
    }

    /// Score one answer, creating the record on first sight
    ///
    /// Returns the updated record.
    pub fn record_answer(&self, answer: Answer) -> MasteryItem {
        let mut items = self.items.write();

        let words = items.entry(answer.subject.clone()).or_default();
        let item = words
            .entry(answer.word_id.clone())
            .or_insert_with(|| MasteryItem::new(answer.word_id.clone()));

        let from = item.mastery;
        score_answer(item, &answer, Utc::now());
        let updated = item.clone();

        if from != updated.mastery {
            debug!(
                "{}/{}: {} -> {} (fluency {})",
                answer.subject, answer.word_id, from, updated.mastery, updated.fluency_score
            );
        }

        self.mark_dirty(Some((answer.subject.as_str(), answer.seconds())));
        drop(items);

        let _ = self.changes.send(MasteryChange {
            subject: answer.subject,
            word_id: answer.word_id,
            from,
            to: updated.mastery,
            was_correct: answer.is_correct,
            fluency_score: updated.fluency_score,
        });

        updated
    }

    /// Fold imported records for one subject into the collection
    pub fn merge_subject(
        &self,
        subject: &str,
        incoming: HashMap<String, MasteryItem>,
        strategy: MergeStrategy,
    ) -> MergeOutcome {
        let mut items = self.items.write();
        let mut outcome = MergeOutcome::default();

        let incoming = incoming.into_iter().map(|(word_id, mut item)| {
            item.id = word_id.clone();
            (word_id, item)
        });

        match strategy {
            MergeStrategy::Replace => {
                let replacement: HashMap<String, MasteryItem> = incoming.collect();
                outcome.imported = replacement.len();
                items.insert(subject.to_string(), replacement);
            }
            MergeStrategy::Add => {
                let words = items.entry(subject.to_string()).or_default();
                for (word_id, item) in incoming {
                    if words.contains_key(&word_id) {
                        outcome.skipped += 1;
                    } else {
                        words.insert(word_id, item);
                        outcome.imported += 1;
                    }
                }
            }
            MergeStrategy::KeepLatest => {
                let words = items.entry(subject.to_string()).or_default();
                for (word_id, item) in incoming {
                    match words.get(&word_id) {
                        Some(existing) if existing.last_seen >= item.last_seen => outcome.skipped += 1,
                        Some(_) => {
                            words.insert(word_id, item);
                            outcome.merged += 1;
                        }
                        None => {
                            words.insert(word_id, item);
                            outcome.imported += 1;
                        }
                    }
                }
            }
        }

        debug!(
            "Merged subject {} ({:?}): {} imported, {} merged, {} skipped",
            subject, strategy, outcome.imported, outcome.merged, outcome.skipped
        );

        self.mark_dirty(None);
        drop(items);
        outcome
    }

    fn mark_dirty(&self, activity: Option<(&str, f64)>) {
        match &self.writer {
            Some(writer) => writer.queue.mark_dirty(activity),
            None => warn!("Mastery writer is gone; change not persisted"),
        }
    }

    /// Block until every change made so far has reached the collaborators
    pub fn flush(&self) {
        let Some(writer) = &self.writer else { return };
        let mut state = writer.queue.state.lock();
        let target = state.requested;
        while state.saved < target && !state.stopped {
            writer.queue.changed.wait(&mut state);
        }
    }

    /// Receive a [`MasteryChange`] for every recorded answer
    pub fn subscribe(&self) -> broadcast::Receiver<MasteryChange> {
        self.changes.subscribe()
    }

    pub fn get_mastery(&self, subject: &str, word_id: &str) -> MasteryLevel {
        self.items
            .read()
            .get(subject)
            .and_then(|words| words.get(word_id))
            .map(|item| item.mastery)
            .unwrap_or_default()
    }

    pub fn get_fluency(&self, subject: &str, word_id: &str) -> u8 {
        self.items
            .read()
            .get(subject)
            .and_then(|words| words.get(word_id))
            .map(|item| item.fluency_score)
            .unwrap_or(0)
    }

    pub fn get_item(&self, subject: &str, word_id: &str) -> Option<MasteryItem> {
        self.items.read().get(subject)?.get(word_id).cloned()
    }

    /// Count of words per level for one subject, zero-filled
    pub fn get_stats(&self, subject: &str) -> BTreeMap<MasteryLevel, usize> {
        let items = self.items.read();
        count_levels(items.get(subject).into_iter().flat_map(|words| words.values()))
    }

    /// Count of words per level across every subject
    pub fn overall_stats(&self) -> BTreeMap<MasteryLevel, usize> {
        let items = self.items.read();
        count_levels(items.values().flat_map(|words| words.values()))
    }

    /// Ids of words currently at `Weak`, sorted
    pub fn weak_words(&self, subject: &str) -> Vec<String> {
        let items = self.items.read();
        let mut ids: Vec<String> = items
            .get(subject)
            .map(|words| {
                words
                    .values()
                    .filter(|item| item.mastery == MasteryLevel::Weak)
                    .map(|item| item.id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self.items.read().keys().cloned().collect();
        subjects.sort();
        subjects
    }

    pub fn subject_items(&self, subject: &str) -> HashMap<String, MasteryItem> {
        self.items.read().get(subject).cloned().unwrap_or_default()
    }

    /// Aggregate counts across every subject
    pub fn snapshot(&self) -> MasterySnapshot {
        MasterySnapshot::from_items(&self.items.read())
    }

    pub fn retention_target_days(&self) -> u32 {
        self.retention.retention_target_days()
    }

    pub fn retention_scale(&self) -> f64 {
        self.retention.retention_scale()
    }

    /// Run several scheduling queries against one consistent snapshot
    pub fn with_scheduler<R>(&self, f: impl FnOnce(&Scheduler<'_>) -> R) -> R {
        let items = self.items.read();
        let scheduler = Scheduler::new(&items, self.retention.retention_scale());
        f(&scheduler)
    }

    /// Due (and optionally due-soon) words, most urgent first
    pub fn review_candidates<'c, V: Reviewable>(
        &self,
        catalog: &'c [V],
        subject: &str,
        include_due_soon: bool,
    ) -> Vec<&'c V> {
        self.with_scheduler(|s| s.review_candidates(catalog, subject, include_due_soon))
    }

    pub fn sort_by_priority<'c, V: Reviewable>(&self, words: &[&'c V], subject: &str) -> Vec<&'c V> {
        self.with_scheduler(|s| s.sort_by_priority(words, subject))
    }

    /// Words past their scaled interval, lowest level first
    pub fn spaced_repetition_items<'c, V: Reviewable>(&self, catalog: &'c [V], subject: &str) -> Vec<&'c V> {
        self.with_scheduler(|s| s.spaced_repetition_items(catalog, subject))
    }

    pub fn due_count<V: Reviewable>(&self, subject: &str, catalog: &[V]) -> usize {
        self.with_scheduler(|s| s.due_count(subject, catalog))
    }

    /// Quiz questions for `current_session`, see [`select_questions_with_history`]
    pub fn select_questions<'c, V: Reviewable, R: Rng + ?Sized>(
        &self,
        catalog: &'c [V],
        count: usize,
        subject: &str,
        current_session: i64,
        rng: &mut R,
    ) -> Vec<&'c V> {
        let items = self.items.read();
        select_questions_with_history(&items, catalog, count, subject, current_session, rng)
    }
}

impl Drop for MasteryTracker {
    fn drop(&mut self) {
        if let Some(Writer { queue, handle }) = self.writer.take() {
            queue.state.lock().closed = true;
            queue.changed.notify_all();
            if handle.join().is_err() {
                warn!("Mastery writer panicked");
            }
        }
    }
}

fn count_levels<'a>(items: impl Iterator<Item = &'a MasteryItem>) -> BTreeMap<MasteryLevel, usize> {
    let mut counts: BTreeMap<MasteryLevel, usize> =
        MasteryLevel::ALL.iter().map(|level| (*level, 0)).collect();
    for item in items {
        *counts.entry(item.mastery).or_insert(0) += 1;
    }
    counts
}
