//! Core data models shared by the ranker, the scheduler, and the stores.
//!
//! Chunks are immutable once ingested. Scored results exist only for the
//! duration of one ranking call. Flashcards carry their scheduling state and
//! a version counter used for optimistic concurrency on review writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// A unit of retrievable text with its precomputed embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk identifier, unique within the corpus.
    pub id: String,
    /// Grouping key partitioning the corpus (e.g. course + owner).
    pub scope: String,
    /// Parent document identifier; all chunks of a document are removed together.
    pub document_id: String,
    /// Position of the chunk within its document.
    #[serde(default)]
    pub chunk_index: i64,
    /// Human-readable origin, carried through for citations.
    pub source_label: String,
    /// Chunk text.
    pub text: String,
    /// SHA-256 of `text`.
    #[serde(default)]
    pub hash: String,
    /// Embedding produced by the external embedding model.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// A chunk annotated with its keyword, vector, and blended scores.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Raw BM25 score (always `>= 0`).
    pub keyword_score: f64,
    /// Max-normalized similarity, `None` when the chunk was not among the
    /// nearest neighbors (or the vector stage was unavailable).
    pub vector_score: Option<f64>,
    /// `alpha * vector + (1 - alpha) * keyword`, both normalized.
    pub hybrid_score: f64,
}

/// Caller-facing ranking result item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedChunk {
    pub chunk_id: String,
    pub text: String,
    pub source_label: String,
    pub hybrid_score: f64,
}

impl From<&ScoredChunk> for RankedChunk {
    fn from(sc: &ScoredChunk) -> Self {
        Self {
            chunk_id: sc.chunk.id.clone(),
            text: sc.chunk.text.clone(),
            source_label: sc.chunk.source_label.clone(),
            hybrid_score: sc.hybrid_score,
        }
    }
}

/// A review rating from 0 (total failure) to 5 (perfect recall).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, ScheduleError> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScheduleError::QualityOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Every valid rating, lowest first.
    pub fn all() -> impl Iterator<Item = Quality> {
        (0..=Self::MAX).map(Quality)
    }
}

impl TryFrom<i64> for Quality {
    type Error = ScheduleError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-card spaced-repetition state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardSchedule {
    /// Interval growth multiplier, never below the configured minimum.
    pub ease_factor: f64,
    /// Days until the next review, always `>= 1`.
    pub interval: u32,
    /// Consecutive passing reviews since the last reset.
    pub repetitions: u32,
    pub next_review_date: DateTime<Utc>,
    /// Last submitted rating. Display only.
    #[serde(default)]
    pub last_review_quality: Option<Quality>,
    #[serde(default)]
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

/// A question/answer card with its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: String,
    pub scope: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
    /// Bumped on every successful schedule write.
    #[serde(default)]
    pub version: u64,
    pub schedule: FlashcardSchedule,
}

impl Flashcard {
    /// True when both sides of the card carry text.
    pub fn is_complete(&self) -> bool {
        !self.question.trim().is_empty() && !self.answer.trim().is_empty()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.schedule.next_review_date <= now
    }
}
