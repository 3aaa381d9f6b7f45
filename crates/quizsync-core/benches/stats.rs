use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use quizsync_core::model::{AttemptRecord, QuestionId};
use quizsync_core::statistics::{compute_stats, compute_subject_breakdown};

const SUBJECTS: [&str; 5] = ["history", "geography", "polity", "economy", "science"];

fn make_history(n: usize) -> Vec<AttemptRecord> {
    (0..n)
        .map(|i| {
            let total = 10 + (i % 20) as u32;
            AttemptRecord::new((i % 7) as u32 % total, total, SUBJECTS[i % SUBJECTS.len()])
                .with_time_spent((i % 90) as u32)
                .with_mistakes(vec![QuestionId::Index(i as u64)])
                .with_timestamp(Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap())
        })
        .collect()
}

fn bench_compute_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_stats");

    for n in [10usize, 1_000, 10_000] {
        let history = make_history(n);
        group.bench_function(format!("n={n}"), |b| {
            b.iter(|| compute_stats(black_box(&history)))
        });
    }

    group.finish();
}

fn bench_subject_breakdown(c: &mut Criterion) {
    let history = make_history(10_000);
    c.bench_function("subject_breakdown/n=10000", |b| {
        b.iter(|| compute_subject_breakdown(black_box(&history)))
    });
}

fn bench_decode_history(c: &mut Criterion) {
    let encoded = serde_json::to_string(&make_history(1_000)).unwrap();
    c.bench_function("decode_history/n=1000", |b| {
        b.iter(|| serde_json::from_str::<Vec<AttemptRecord>>(black_box(&encoded)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_compute_stats,
    bench_subject_breakdown,
    bench_decode_history
);
criterion_main!(benches);
