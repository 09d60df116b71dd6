//! # StudyLens Core
//!
//! Runtime-free logic behind StudyLens course search and flashcards:
//! chunk models, BM25 + vector hybrid ranking, SM-2 scheduling, the review
//! workflow, and the store traits those operations call through.
//!
//! This crate has no tokio, no filesystem I/O, and no clock reads. Callers
//! pass in embeddings, stores, and `now`.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `Chunk`, `ScoredChunk`, `Quality`, `FlashcardSchedule`, `Flashcard` |
//! | [`keyword`] | Query tokenization and BM25 scoring over a scope |
//! | [`search`] | `HybridRanker`: keyword/vector blend with keyword-only fallback |
//! | [`schedule`] | SM-2 `Scheduler` |
//! | [`review`] | Review, due-card, and listing operations over a `FlashcardStore` |
//! | [`chunk`] | Paragraph chunker with overlap |
//! | [`embedding`] | Cosine similarity |
//! | [`store`] | `ChunkStore`, `VectorSearch`, `FlashcardStore`, `InMemoryStore` |
//! | [`error`] | Error enums |

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod keyword;
pub mod models;
pub mod review;
pub mod schedule;
pub mod search;
pub mod store;

pub use error::{RankError, ReviewError, ScheduleError, VectorSearchError};
pub use models::{Chunk, Flashcard, FlashcardSchedule, Quality, RankedChunk, ScoredChunk};
pub use schedule::{Scheduler, SchedulerParams};
pub use search::{DegradedReason, HybridRanker, RankRequest, RankerParams, Ranking};
