//! Core data model types for quizsync.
//!
//! These are the types the result store persists locally, ships to the
//! remote store, and aggregates into study statistics.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// One completed quiz session.
///
/// Field names are serialized in camelCase so the stored history matches the
/// layout written by the browser app (`timeSpent`, `synced`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// Stable identifier, also used as the remote document id.
    #[serde(default = "Uuid::new_v4", deserialize_with = "null_as_new_id")]
    pub id: Uuid,
    /// Number of correct answers.
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: u32,
    /// Number of questions in the attempt.
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u32,
    /// Subject or question bank the attempt belongs to.
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    /// When the attempt was completed.
    #[serde(default = "Utc::now", deserialize_with = "null_as_now")]
    pub timestamp: DateTime<Utc>,
    /// Questions answered incorrectly, in the order they were seen.
    #[serde(default, deserialize_with = "null_as_default")]
    pub mistakes: Vec<QuestionId>,
    /// Time spent on the attempt, in minutes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_spent: u32,
    /// Local-only flag: set once the record is known to exist remotely.
    #[serde(default, deserialize_with = "null_as_default")]
    pub synced: bool,
}

// The browser app wrote `null` for fields it never filled in and read them
// back as `h.total || 0`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn null_as_new_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
    Option::<Uuid>::deserialize(deserializer).map(|id| id.unwrap_or_else(Uuid::new_v4))
}

fn null_as_now<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    Option::<DateTime<Utc>>::deserialize(deserializer).map(|ts| ts.unwrap_or_else(Utc::now))
}

impl AttemptRecord {
    /// Create an unsynced record stamped with the current time.
    pub fn new(score: u32, total: u32, subject: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            score,
            total,
            subject: subject.into(),
            timestamp: Utc::now(),
            mistakes: Vec::new(),
            time_spent: 0,
            synced: false,
        }
    }

    pub fn with_time_spent(mut self, minutes: u32) -> Self {
        self.time_spent = minutes;
        self
    }

    pub fn with_mistakes(mut self, mistakes: Vec<QuestionId>) -> Self {
        self.mistakes = mistakes;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Check the `score <= total` invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.score > self.total {
            return Err(format!(
                "score {} exceeds total {} for attempt {}",
                self.score, self.total, self.id
            ));
        }
        Ok(())
    }
}

/// Identifier of a question inside a bank.
///
/// Banks use either numeric indices or string keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionId {
    Index(u64),
    Key(String),
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionId::Index(i) => write!(f, "{i}"),
            QuestionId::Key(k) => write!(f, "{k}"),
        }
    }
}

impl From<&str> for QuestionId {
    fn from(s: &str) -> Self {
        match s.parse::<u64>() {
            Ok(i) => QuestionId::Index(i),
            Err(_) => QuestionId::Key(s.to_string()),
        }
    }
}

/// Opaque identity of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where results are routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Local,
    Cloud,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Local => write!(f, "local"),
            Mode::Cloud => write!(f, "cloud"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "offline" => Ok(Mode::Local),
            "cloud" | "remote" => Ok(Mode::Cloud),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Remote per-user aggregate document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_questions: u64,
    pub total_correct: u64,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
}

/// Delta applied to the remote aggregate by merge-increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateDelta {
    pub questions: u64,
    pub correct: u64,
}

impl From<&AttemptRecord> for AggregateDelta {
    fn from(record: &AttemptRecord) -> Self {
        Self {
            questions: u64::from(record.total),
            correct: u64::from(record.score),
        }
    }
}

/// Dashboard statistics computed from the local history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyStats {
    pub total_questions: u64,
    /// Percentage of correct answers, 0..=100.
    pub accuracy: u32,
    pub study_hours: u64,
    pub history_count: usize,
}
