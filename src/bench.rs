//! Performance benchmarking for Kioku
//!
//! Measures the hot paths against a synthetic catalog:
//! - Answer scoring: <0.1ms
//! - Review queue over 5000 words: <10ms
//! - Quiz selection over 5000 words: <10ms
//! - SQLite save of the full collection: <50ms

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Instant;

use kioku::storage::{Persistence, SqliteStore};
use kioku::{Answer, FixedRetention, MasteryTracker, Vocabulary};

const CATALOG_SIZE: usize = 5000;
const SUBJECT: &str = "bench";

#[derive(Debug, Default)]
pub struct BenchmarkResults {
    pub answer_avg_us: f64,
    pub review_avg_ms: f64,
    pub quiz_avg_ms: f64,
    pub save_avg_ms: f64,
}

/// Run performance benchmarks
pub fn run_benchmarks() -> Result<BenchmarkResults> {
    println!("Kioku Performance Benchmarks");
    println!("============================");
    println!();

    let mut results = BenchmarkResults::default();
    let catalog = synthetic_catalog(CATALOG_SIZE);
    let tracker = MasteryTracker::in_memory(Arc::new(FixedRetention::default()))?;
    let mut rng = StdRng::seed_from_u64(42);

    // Benchmark 1: answer scoring, which also builds the collection
    println!("1. Answer Scoring");
    println!("   Target: <0.1ms");
    let answer_times = benchmark_answers(&tracker, &catalog, &mut rng);
    results.answer_avg_us = average(&answer_times);
    tracker.flush();
    report_us(&answer_times);
    pass_or_fail(results.answer_avg_us < 100.0, "exceeds 0.1ms target");

    // Benchmark 2: review queue
    println!("2. Review Queue ({} words)", CATALOG_SIZE);
    println!("   Target: <10ms");
    let review_times = benchmark_review(&tracker, &catalog, 20);
    results.review_avg_ms = average(&review_times) / 1000.0;
    report_ms(&review_times);
    pass_or_fail(results.review_avg_ms < 10.0, "exceeds 10ms target");

    // Benchmark 3: quiz selection
    println!("3. Quiz Selection ({} words)", CATALOG_SIZE);
    println!("   Target: <10ms");
    let quiz_times = benchmark_quiz(&tracker, &catalog, &mut rng, 20);
    results.quiz_avg_ms = average(&quiz_times) / 1000.0;
    report_ms(&quiz_times);
    pass_or_fail(results.quiz_avg_ms < 10.0, "exceeds 10ms target");

    // Benchmark 4: persistence
    println!("4. SQLite Save");
    println!("   Target: <50ms");
    let save_times = benchmark_save(&tracker, 5)?;
    results.save_avg_ms = average(&save_times) / 1000.0;
    report_ms(&save_times);
    pass_or_fail(results.save_avg_ms < 50.0, "exceeds 50ms target");

    // Summary
    println!("Summary");
    println!("-------");
    let all_pass = results.answer_avg_us < 100.0 && results.review_avg_ms < 10.0 && results.quiz_avg_ms < 10.0;
    if all_pass {
        println!("✅ All critical benchmarks PASSED");
    } else {
        println!("❌ Some benchmarks FAILED - optimization needed");
    }
    println!();

    let snapshot = tracker.snapshot();
    println!(
        "Records: {} ({} mastered, {}% mastery rate)",
        snapshot.total_words, snapshot.mastered_count, snapshot.mastery_rate
    );

    Ok(results)
}

fn synthetic_catalog(size: usize) -> Vec<Vocabulary> {
    (0..size)
        .map(|i| Vocabulary::new(format!("w{:05}", i), format!("term-{}", i), format!("meaning-{}", i)))
        .collect()
}

/// Answer every word a few times with a mix of speeds and mistakes
fn benchmark_answers(tracker: &MasteryTracker, catalog: &[Vocabulary], rng: &mut StdRng) -> Vec<u128> {
    let mut times = Vec::with_capacity(catalog.len() * 3);

    for round in 0..3i64 {
        for word in catalog {
            let answer = Answer::new(SUBJECT, word.id.clone(), rng.gen_bool(0.8))
                .with_response_time(rng.gen_range(0.5..12.0))
                .with_session(round + 1);

            let start = Instant::now();
            tracker.record_answer(answer);
            times.push(start.elapsed().as_micros());
        }
    }

    times
}

fn benchmark_review(tracker: &MasteryTracker, catalog: &[Vocabulary], iterations: usize) -> Vec<u128> {
    (0..iterations)
        .map(|_| {
            let start = Instant::now();
            let queue = tracker.review_candidates(catalog, SUBJECT, true);
            let elapsed = start.elapsed().as_micros();
            std::hint::black_box(queue.len());
            elapsed
        })
        .collect()
}

fn benchmark_quiz(
    tracker: &MasteryTracker,
    catalog: &[Vocabulary],
    rng: &mut StdRng,
    iterations: usize,
) -> Vec<u128> {
    (0..iterations)
        .map(|i| {
            let start = Instant::now();
            let questions = tracker.select_questions(catalog, 20, SUBJECT, 4 + i as i64, rng);
            let elapsed = start.elapsed().as_micros();
            std::hint::black_box(questions.len());
            elapsed
        })
        .collect()
}

/// Encode and write the whole collection the way the background writer does
fn benchmark_save(tracker: &MasteryTracker, iterations: usize) -> Result<Vec<u128>> {
    let dir = std::env::temp_dir().join(format!("kioku-bench-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let mut store = SqliteStore::open(&dir.join("bench.sqlite"))?;

    let mut items = std::collections::HashMap::new();
    items.insert(SUBJECT.to_string(), tracker.subject_items(SUBJECT));

    let mut times = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let start = Instant::now();
        let bytes = serde_json::to_vec(&items)?;
        store.save(kioku::mastery::MASTERY_KEY, &bytes)?;
        times.push(start.elapsed().as_micros());
    }

    drop(store);
    if let Err(e) = std::fs::remove_dir_all(&dir) {
        tracing::warn!("Failed to clean up {:?}: {}", dir, e);
    }
    Ok(times)
}

fn average(times: &[u128]) -> f64 {
    if times.is_empty() {
        return 0.0;
    }
    times.iter().sum::<u128>() as f64 / times.len() as f64
}

fn report_us(times: &[u128]) {
    let min = times.iter().min().copied().unwrap_or(0);
    let max = times.iter().max().copied().unwrap_or(0);
    println!("   Avg: {:.1}µs  Min: {}µs  Max: {}µs", average(times), min, max);
}

fn report_ms(times: &[u128]) {
    let min = times.iter().min().copied().unwrap_or(0);
    let max = times.iter().max().copied().unwrap_or(0);
    println!(
        "   Avg: {:.3}ms  Min: {:.3}ms  Max: {:.3}ms",
        average(times) / 1000.0,
        min as f64 / 1000.0,
        max as f64 / 1000.0
    );
}

fn pass_or_fail(passed: bool, reason: &str) {
    if passed {
        println!("   ✅ PASS");
    } else {
        println!("   ❌ FAIL ({})", reason);
    }
    println!();
}
