//! In-memory implementation of every store trait.
//!
//! Chunks live in a `Vec` behind a `RwLock` so scope enumeration order is
//! the insertion order. Vector search is brute-force cosine similarity over
//! the requested scope. Each scope has a fixed embedding dimensionality,
//! set by the first chunk ingested into it.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, is_finite};
use crate::error::VectorSearchError;
use crate::models::{Chunk, Flashcard, FlashcardSchedule};

use super::{ChunkStore, FlashcardStore, Neighbor, VectorSearch};

/// In-memory chunk corpus and flashcard deck.
pub struct InMemoryStore {
    chunks: RwLock<Vec<Chunk>>,
    dims: RwLock<HashMap<String, usize>>,
    flashcards: RwLock<HashMap<String, Flashcard>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            dims: RwLock::new(HashMap::new()),
            flashcards: RwLock::new(HashMap::new()),
        }
    }

    /// Append chunks to the corpus.
    ///
    /// The batch is validated as a whole before anything is written: every
    /// chunk needs a non-empty, finite embedding whose length matches its
    /// scope, and ids must be unique across the corpus.
    pub fn insert_chunks(&self, batch: Vec<Chunk>) -> Result<usize> {
        let mut chunks = write(&self.chunks)?;
        let mut dims = write(&self.dims)?;

        let mut seen: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let mut batch_dims: HashMap<&str, usize> = HashMap::new();

        for c in &batch {
            if c.embedding.is_empty() {
                bail!("chunk {} has no embedding", c.id);
            }
            if !is_finite(&c.embedding) {
                bail!("chunk {} has a non-finite embedding", c.id);
            }
            if !seen.insert(c.id.as_str()) {
                bail!("duplicate chunk id: {}", c.id);
            }
            let expected = dims
                .get(&c.scope)
                .copied()
                .or_else(|| batch_dims.get(c.scope.as_str()).copied());
            match expected {
                Some(d) if d != c.embedding.len() => bail!(
                    "chunk {} has {} dimensions, scope '{}' uses {}",
                    c.id,
                    c.embedding.len(),
                    c.scope,
                    d
                ),
                Some(_) => {}
                None => {
                    batch_dims.insert(c.scope.as_str(), c.embedding.len());
                }
            }
        }

        let new_dims: Vec<(String, usize)> = batch_dims
            .into_iter()
            .map(|(scope, d)| (scope.to_string(), d))
            .collect();
        drop(seen);

        dims.extend(new_dims);
        let count = batch.len();
        chunks.extend(batch);
        Ok(count)
    }

    /// Delete every chunk belonging to `document_id`. Returns the number removed.
    pub fn remove_document(&self, document_id: &str) -> Result<usize> {
        let mut chunks = write(&self.chunks)?;
        let before = chunks.len();
        chunks.retain(|c| c.document_id != document_id);
        let removed = before - chunks.len();

        let live: HashSet<&str> = chunks.iter().map(|c| c.scope.as_str()).collect();
        write(&self.dims)?.retain(|scope, _| live.contains(scope.as_str()));
        Ok(removed)
    }

    /// All chunks, in insertion order.
    pub fn chunks_snapshot(&self) -> Result<Vec<Chunk>> {
        Ok(read(&self.chunks)?.clone())
    }

    /// Embedding dimensionality of `scope`, if it holds any chunks.
    pub fn scope_dims(&self, scope: &str) -> Result<Option<usize>> {
        Ok(read(&self.dims)?.get(scope).copied())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn get_chunks(&self, scope: &str) -> Result<Vec<Chunk>> {
        Ok(read(&self.chunks)?
            .iter()
            .filter(|c| c.scope == scope)
            .cloned()
            .collect())
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        Ok(read(&self.chunks)?.iter().find(|c| c.id == id).cloned())
    }
}

#[async_trait]
impl VectorSearch for InMemoryStore {
    async fn nearest_neighbors(
        &self,
        query_vec: &[f32],
        scope: &str,
        k: usize,
    ) -> std::result::Result<Vec<Neighbor>, VectorSearchError> {
        if let Some(d) = self.scope_dims(scope)? {
            if d != query_vec.len() {
                return Err(anyhow!(
                    "query embedding has {} dimensions, scope '{}' uses {}",
                    query_vec.len(),
                    scope,
                    d
                )
                .into());
            }
        }

        let chunks = read(&self.chunks)?;
        let mut hits: Vec<Neighbor> = chunks
            .iter()
            .filter(|c| c.scope == scope)
            .map(|c| Neighbor {
                chunk_id: c.id.clone(),
                similarity: cosine_similarity(query_vec, &c.embedding) as f64,
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        Ok(hits)
    }
}

#[async_trait]
impl FlashcardStore for InMemoryStore {
    async fn get_flashcard(&self, id: &str) -> Result<Option<Flashcard>> {
        Ok(read(&self.flashcards)?.get(id).cloned())
    }

    async fn list_flashcards(&self, scope: &str) -> Result<Vec<Flashcard>> {
        Ok(read(&self.flashcards)?
            .values()
            .filter(|c| c.scope == scope)
            .cloned()
            .collect())
    }

    async fn insert_flashcard(&self, card: &Flashcard) -> Result<()> {
        let mut cards = write(&self.flashcards)?;
        if cards.contains_key(&card.id) {
            bail!("duplicate flashcard id: {}", card.id);
        }
        cards.insert(card.id.clone(), card.clone());
        Ok(())
    }

    async fn compare_and_swap_schedule(
        &self,
        id: &str,
        expected_version: u64,
        schedule: &FlashcardSchedule,
    ) -> Result<bool> {
        let mut cards = write(&self.flashcards)?;
        match cards.get_mut(id) {
            Some(card) if card.version == expected_version => {
                card.schedule = schedule.clone();
                card.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_flashcard(&self, id: &str) -> Result<bool> {
        Ok(write(&self.flashcards)?.remove(id).is_some())
    }
}
