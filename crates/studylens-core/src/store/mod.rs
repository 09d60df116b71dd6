//! Storage abstractions the ranker and the review workflow call through.
//!
//! | Trait | Used by | Purpose |
//! |-------|---------|---------|
//! | [`ChunkStore`] | keyword stage | enumerate a scope, look up chunks by id |
//! | [`VectorSearch`] | vector stage | approximate nearest neighbors within a scope |
//! | [`FlashcardStore`] | review workflow | read and compare-and-swap card schedules |
//!
//! Implementations must be `Send + Sync`; concurrent `rank` calls over the
//! same scope only read. All methods are async (via `async-trait`) so remote
//! backends fit behind the same interface as [`memory::InMemoryStore`].

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::VectorSearchError;
use crate::models::{Chunk, Flashcard, FlashcardSchedule};

/// A nearest-neighbor hit returned by a [`VectorSearch`] backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub chunk_id: String,
    /// Provider-defined similarity; higher is more similar.
    pub similarity: f64,
}

/// Read access to the chunk corpus.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// All chunks in `scope`, in a stable enumeration order.
    async fn get_chunks(&self, scope: &str) -> Result<Vec<Chunk>>;

    /// A single chunk by id, in any scope.
    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>>;
}

/// Similarity search over chunk embeddings.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Up to `k` chunks from `scope` closest to `query_vec`, best-effort
    /// descending by similarity.
    async fn nearest_neighbors(
        &self,
        query_vec: &[f32],
        scope: &str,
        k: usize,
    ) -> std::result::Result<Vec<Neighbor>, VectorSearchError>;
}

/// Persistence for flashcards and their schedules.
#[async_trait]
pub trait FlashcardStore: Send + Sync {
    async fn get_flashcard(&self, id: &str) -> Result<Option<Flashcard>>;

    /// All cards in `scope`, in any order.
    async fn list_flashcards(&self, scope: &str) -> Result<Vec<Flashcard>>;

    async fn insert_flashcard(&self, card: &Flashcard) -> Result<()>;

    /// Replace the schedule of card `id` only if its version still equals
    /// `expected_version`, bumping the version on success.
    ///
    /// Returns `false` when the version moved (or the card is gone).
    async fn compare_and_swap_schedule(
        &self,
        id: &str,
        expected_version: u64,
        schedule: &FlashcardSchedule,
    ) -> Result<bool>;

    /// Returns `true` if a card was removed.
    async fn delete_flashcard(&self, id: &str) -> Result<bool>;
}
