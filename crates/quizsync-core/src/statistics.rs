//! Study statistics computed from the local history.
//!
//! All rounding is half-up on non-negative integers, done without floats.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{AttemptRecord, StudyStats};

const MINUTES_PER_HOUR: u64 = 60;

/// Divide and round half-up. `den` must be non-zero.
fn round_div(num: u64, den: u64) -> u64 {
    (2 * num + den) / (2 * den)
}

/// `round(100 * correct / total)`, 0 when `total` is 0, clamped to 100.
pub fn accuracy_percent(correct: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    round_div(100 * correct, total).min(100) as u32
}

/// Whole study hours from minutes, rounded to the nearest hour.
pub fn study_hours(minutes: u64) -> u64 {
    round_div(minutes, MINUTES_PER_HOUR)
}

/// Compute dashboard statistics for a history.
pub fn compute_stats(history: &[AttemptRecord]) -> StudyStats {
    if history.is_empty() {
        return StudyStats::default();
    }

    let mut total_questions = 0u64;
    let mut correct = 0u64;
    let mut minutes = 0u64;
    for record in history {
        total_questions += u64::from(record.total);
        correct += u64::from(record.score);
        minutes += u64::from(record.time_spent);
    }

    StudyStats {
        total_questions,
        accuracy: accuracy_percent(correct, total_questions),
        study_hours: study_hours(minutes),
        history_count: history.len(),
    }
}

/// Statistics for a single subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub subject: String,
    pub attempts: usize,
    pub total_questions: u64,
    pub total_correct: u64,
    pub accuracy: u32,
}

/// Per-subject breakdown, ordered by subject name.
pub fn compute_subject_breakdown(history: &[AttemptRecord]) -> Vec<SubjectStats> {
    let mut grouped: BTreeMap<&str, (usize, u64, u64)> = BTreeMap::new();
    for record in history {
        let entry = grouped.entry(record.subject.as_str()).or_default();
        entry.0 += 1;
        entry.1 += u64::from(record.total);
        entry.2 += u64::from(record.score);
    }

    grouped
        .into_iter()
        .map(|(subject, (attempts, total, correct))| SubjectStats {
            subject: subject.to_string(),
            attempts,
            total_questions: total,
            total_correct: correct,
            accuracy: accuracy_percent(correct, total),
        })
        .collect()
}
