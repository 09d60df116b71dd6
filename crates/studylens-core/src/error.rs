//! Error types for ranking, scheduling, and review.
//!
//! Input validation failures are distinct variants so callers can tell a
//! rejected request apart from an unavailable backend. An empty result list
//! is never an error.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`HybridRanker::rank`](crate::search::HybridRanker::rank).
#[derive(Debug, Error)]
pub enum RankError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("limit must be >= 1")]
    InvalidLimit,

    #[error("alpha must be in [0.0, 1.0], got {0}")]
    InvalidAlpha(f64),

    /// The chunk store could not enumerate the scope. Keyword ranking is
    /// impossible, so the call fails as a whole.
    #[error("chunk store unavailable: {0:#}")]
    Store(#[source] anyhow::Error),
}

/// Errors reported by a [`VectorSearch`](crate::store::VectorSearch) backend.
///
/// The ranker recovers from all of these by ranking on keywords alone.
#[derive(Debug, Error)]
pub enum VectorSearchError {
    #[error("vector search timed out after {0:?}")]
    Timeout(Duration),

    #[error("vector search unavailable: {0:#}")]
    Unavailable(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("quality must be between 0 and 5, got {0}")]
    QualityOutOfRange(i64),
}

/// Errors returned by the flashcard review workflow.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    InvalidQuality(#[from] ScheduleError),

    #[error("flashcard not found: {0}")]
    NotFound(String),

    /// The card was rewritten between read and write. Retry with a fresh read.
    #[error("flashcard {0} was modified concurrently")]
    Conflict(String),

    #[error("flashcard store error: {0:#}")]
    Store(#[source] anyhow::Error),
}
