//! Hybrid keyword + vector ranking of chunks within one scope.
//!
//! The ranker works entirely through the [`ChunkStore`] and [`VectorSearch`]
//! traits. The caller embeds the query, builds a [`RankRequest`], and
//! passes the backends it wants to search.
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Enumerate the scope and BM25-score every chunk ([`crate::keyword`]).
//! 2. Fetch `limit × candidate_multiplier` nearest neighbors.
//! 3. Normalize both score sets by dividing by their maximum.
//! 4. Merge by chunk id: `score = α × vector + (1 - α) × keyword`.
//! 5. Stable sort by score (desc) and truncate to `limit`.
//!
//! When the vector stage is unavailable (no query embedding, backend error,
//! timeout) the call still succeeds as [`Ranking::Degraded`], ranked on
//! keywords alone.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{RankError, VectorSearchError};
use crate::keyword::{tokenize_query, Bm25Params, Bm25Scorer};
use crate::models::{Chunk, RankedChunk, ScoredChunk};
use crate::store::{ChunkStore, Neighbor, VectorSearch};

pub const DEFAULT_LIMIT: usize = 15;
pub const DEFAULT_ALPHA: f64 = 0.5;

/// Ranking tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RankerParams {
    pub bm25: Bm25Params,
    /// Nearest neighbors requested per result slot.
    pub candidate_multiplier: usize,
}

impl Default for RankerParams {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            candidate_multiplier: 2,
        }
    }
}

/// Inputs for a single ranking call.
#[derive(Debug, Clone)]
pub struct RankRequest<'a> {
    pub query: &'a str,
    /// Pre-computed query embedding. `None` ranks on keywords alone.
    pub query_embedding: Option<&'a [f32]>,
    pub scope: &'a str,
    pub limit: usize,
    /// Weight of the vector score: `hybrid = α·vector + (1-α)·keyword`.
    pub alpha: f64,
}

impl<'a> RankRequest<'a> {
    pub fn new(query: &'a str, scope: &'a str) -> Self {
        Self {
            query,
            query_embedding: None,
            scope,
            limit: DEFAULT_LIMIT,
            alpha: DEFAULT_ALPHA,
        }
    }

    pub fn with_embedding(mut self, embedding: &'a [f32]) -> Self {
        self.query_embedding = Some(embedding);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    fn validate(&self) -> Result<(), RankError> {
        if self.query.trim().is_empty() {
            return Err(RankError::EmptyQuery);
        }
        if self.limit == 0 {
            return Err(RankError::InvalidLimit);
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(RankError::InvalidAlpha(self.alpha));
        }
        Ok(())
    }
}

/// Why the vector stage did not contribute to a ranking.
#[derive(Debug, Clone, PartialEq)]
pub enum DegradedReason {
    MissingQueryEmbedding,
    TimedOut(Duration),
    Unavailable(String),
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradedReason::MissingQueryEmbedding => write!(f, "no query embedding supplied"),
            DegradedReason::TimedOut(d) => write!(f, "vector search timed out after {d:?}"),
            DegradedReason::Unavailable(msg) => write!(f, "vector search unavailable: {msg}"),
        }
    }
}

impl From<VectorSearchError> for DegradedReason {
    fn from(err: VectorSearchError) -> Self {
        match err {
            VectorSearchError::Timeout(d) => DegradedReason::TimedOut(d),
            VectorSearchError::Unavailable(e) => DegradedReason::Unavailable(format!("{e:#}")),
        }
    }
}

/// Outcome of a ranking call.
#[derive(Debug, Clone)]
pub enum Ranking {
    /// Both stages contributed.
    Ranked(Vec<ScoredChunk>),
    /// Keyword-only ranking; the vector stage was skipped or failed.
    Degraded {
        results: Vec<ScoredChunk>,
        reason: DegradedReason,
    },
}

impl Ranking {
    pub fn results(&self) -> &[ScoredChunk] {
        match self {
            Ranking::Ranked(results) | Ranking::Degraded { results, .. } => results,
        }
    }

    pub fn into_results(self) -> Vec<ScoredChunk> {
        match self {
            Ranking::Ranked(results) | Ranking::Degraded { results, .. } => results,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Ranking::Degraded { .. })
    }

    pub fn degraded_reason(&self) -> Option<&DegradedReason> {
        match self {
            Ranking::Degraded { reason, .. } => Some(reason),
            Ranking::Ranked(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results().is_empty()
    }

    /// Caller-facing result items.
    pub fn to_response(&self) -> Vec<RankedChunk> {
        self.results().iter().map(RankedChunk::from).collect()
    }
}

/// Blends BM25 and vector similarity into a single ranking.
#[derive(Debug, Clone, Default)]
pub struct HybridRanker {
    params: RankerParams,
    scorer: Bm25Scorer,
}

impl HybridRanker {
    pub fn new(params: RankerParams) -> Self {
        Self {
            scorer: Bm25Scorer::new(params.bm25),
            params,
        }
    }

    pub fn params(&self) -> &RankerParams {
        &self.params
    }

    /// Rank the chunks of `req.scope` against `req.query`.
    ///
    /// Fails only on invalid input or when `store` cannot enumerate the
    /// scope. An empty scope yields an empty [`Ranking::Ranked`].
    pub async fn rank<S, V>(
        &self,
        store: &S,
        vectors: &V,
        req: &RankRequest<'_>,
    ) -> Result<Ranking, RankError>
    where
        S: ChunkStore + ?Sized,
        V: VectorSearch + ?Sized,
    {
        req.validate()?;

        let chunks = store.get_chunks(req.scope).await.map_err(RankError::Store)?;
        if chunks.is_empty() {
            return Ok(Ranking::Ranked(Vec::new()));
        }

        let terms = tokenize_query(req.query);
        let keyword_scores = self.scorer.score_all(&terms, &chunks);

        let k = req.limit.saturating_mul(self.params.candidate_multiplier.max(1));
        let vector_stage: Result<Vec<Neighbor>, DegradedReason> = match req.query_embedding {
            Some(qv) => vectors
                .nearest_neighbors(qv, req.scope, k)
                .await
                .map_err(DegradedReason::from),
            None => Err(DegradedReason::MissingQueryEmbedding),
        };

        let (similarities, alpha, degraded) = match vector_stage {
            Ok(neighbors) => (scope_similarities(&chunks, &neighbors), req.alpha, None),
            Err(reason) => {
                warn!(scope = req.scope, %reason, "ranking degraded to keyword-only");
                (HashMap::new(), 0.0, Some(reason))
            }
        };

        debug!(
            scope = req.scope,
            terms = terms.len(),
            chunks = chunks.len(),
            neighbors = similarities.len(),
            alpha,
            "hybrid rank"
        );

        let results = blend(chunks, &keyword_scores, &similarities, alpha, req.limit);

        Ok(match degraded {
            Some(reason) => Ranking::Degraded { results, reason },
            None => Ranking::Ranked(results),
        })
    }
}

/// Map neighbor hits onto chunk ids in scope.
///
/// Hits outside the scope are dropped, repeated ids keep their best
/// similarity, and negative similarities are floored at zero.
fn scope_similarities(chunks: &[Chunk], neighbors: &[Neighbor]) -> HashMap<String, f64> {
    let in_scope: HashMap<&str, ()> = chunks.iter().map(|c| (c.id.as_str(), ())).collect();
    let mut sims: HashMap<String, f64> = HashMap::new();
    for n in neighbors {
        if !in_scope.contains_key(n.chunk_id.as_str()) || !n.similarity.is_finite() {
            continue;
        }
        let sim = n.similarity.max(0.0);
        sims.entry(n.chunk_id.clone())
            .and_modify(|s| *s = s.max(sim))
            .or_insert(sim);
    }
    sims
}

fn blend(
    chunks: Vec<Chunk>,
    keyword_scores: &[f64],
    similarities: &HashMap<String, f64>,
    alpha: f64,
    limit: usize,
) -> Vec<ScoredChunk> {
    let kw_divisor = max_divisor(keyword_scores.iter().copied());
    let vec_divisor = max_divisor(similarities.values().copied());

    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .zip(keyword_scores.iter().copied())
        .map(|(chunk, keyword_score)| {
            let vector_score = similarities.get(&chunk.id).map(|s| s / vec_divisor);
            let k = keyword_score / kw_divisor;
            let v = vector_score.unwrap_or(0.0);
            ScoredChunk {
                chunk,
                keyword_score,
                vector_score,
                hybrid_score: alpha * v + (1.0 - alpha) * k,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.hybrid_score.total_cmp(&a.hybrid_score));
    scored.truncate(limit);
    scored
}

/// Divisor for max-normalization: the maximum, or `1.0` when it is not positive.
///
/// Both stages share this rule. The vector stage could also be read as
/// `max(max_vector, 1.0)`, which would leave cosines below 1 unscaled; we
/// scale them like keyword scores, so the best vector match always
/// normalizes to `1.0`.
fn max_divisor(scores: impl Iterator<Item = f64>) -> f64 {
    let max = scores.fold(0.0_f64, f64::max);
    if max > 0.0 {
        max
    } else {
        1.0
    }
}

/// Divide every score by the maximum score (or by `1.0` if it is not positive).
///
/// ```rust
/// use studylens_core::search::normalize_by_max;
///
/// assert_eq!(normalize_by_max(&[2.0, 1.0, 0.0]), vec![1.0, 0.5, 0.0]);
/// assert_eq!(normalize_by_max(&[0.0, 0.0]), vec![0.0, 0.0]);
/// ```
pub fn normalize_by_max(scores: &[f64]) -> Vec<f64> {
    let divisor = max_divisor(scores.iter().copied());
    scores.iter().map(|s| s / divisor).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::store::memory::InMemoryStore;

    fn chunk(id: &str, scope: &str, text: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            scope: scope.to_string(),
            document_id: format!("doc-{id}"),
            chunk_index: 0,
            source_label: format!("{id}.pdf"),
            text: text.to_string(),
            hash: String::new(),
            embedding,
        }
    }

    fn ids(ranking: &Ranking) -> Vec<&str> {
        ranking.results().iter().map(|s| s.chunk.id.as_str()).collect()
    }

    /// Vector backend returning a fixed hit list.
    struct FixedNeighbors(Vec<Neighbor>);

    #[async_trait]
    impl VectorSearch for FixedNeighbors {
        async fn nearest_neighbors(
            &self,
            _query_vec: &[f32],
            _scope: &str,
            k: usize,
        ) -> Result<Vec<Neighbor>, VectorSearchError> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct FailingVectors;

    #[async_trait]
    impl VectorSearch for FailingVectors {
        async fn nearest_neighbors(
            &self,
            _query_vec: &[f32],
            _scope: &str,
            _k: usize,
        ) -> Result<Vec<Neighbor>, VectorSearchError> {
            Err(VectorSearchError::Timeout(Duration::from_millis(250)))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ChunkStore for FailingStore {
        async fn get_chunks(&self, _scope: &str) -> anyhow::Result<Vec<Chunk>> {
            anyhow::bail!("connection refused")
        }

        async fn get_chunk(&self, _id: &str) -> anyhow::Result<Option<Chunk>> {
            anyhow::bail!("connection refused")
        }
    }

    fn hit(id: &str, similarity: f64) -> Neighbor {
        Neighbor {
            chunk_id: id.to_string(),
            similarity,
        }
    }

    fn pets_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_chunks(vec![
                chunk("both", "bio", "cats and dogs share the house", vec![0.0, 1.0]),
                chunk("neither", "bio", "photosynthesis happens in leaves", vec![1.0, 0.0]),
                chunk("cats", "bio", "cats purr when they are content", vec![0.7, 0.7]),
                chunk("elsewhere", "chem", "cats dogs cats dogs", vec![0.0, 1.0]),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_normalize_by_max() {
        assert!(normalize_by_max(&[]).is_empty());
        assert_eq!(normalize_by_max(&[4.0]), vec![1.0]);
        assert_eq!(normalize_by_max(&[10.0, 5.0, 0.0]), vec![1.0, 0.5, 0.0]);
        // Maxima below one are scaled up, not floored at one.
        assert_eq!(normalize_by_max(&[0.5, 0.25]), vec![1.0, 0.5]);
        assert_eq!(normalize_by_max(&[-0.5, 0.0]), vec![-0.5, 0.0]);
    }

    #[test]
    fn test_scope_similarities_filters_and_floors() {
        let chunks = vec![chunk("a", "s", "x", vec![1.0]), chunk("b", "s", "y", vec![1.0])];
        let sims = scope_similarities(
            &chunks,
            &[hit("a", 0.2), hit("a", 0.6), hit("b", -0.4), hit("zz", 0.9)],
        );
        assert_eq!(sims.len(), 2);
        assert_eq!(sims["a"], 0.6);
        assert_eq!(sims["b"], 0.0);
    }

    #[tokio::test]
    async fn test_keyword_ranking_cats_dogs() {
        let store = pets_store();
        let ranker = HybridRanker::default();
        let req = RankRequest::new("cats dogs", "bio").with_alpha(0.0).with_embedding(&[1.0, 0.0]);
        let ranking = ranker.rank(&store, &store, &req).await.unwrap();

        assert!(!ranking.is_degraded());
        assert_eq!(ids(&ranking), vec!["both", "cats", "neither"]);
        assert_eq!(ranking.results()[2].keyword_score, 0.0);
        assert!((ranking.results()[0].hybrid_score - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_alpha_one_follows_vector_order() {
        let store = pets_store();
        let vectors = FixedNeighbors(vec![hit("neither", 0.9), hit("cats", 0.6), hit("both", 0.3)]);
        let req = RankRequest::new("cats dogs", "bio").with_alpha(1.0).with_embedding(&[0.0]);
        let ranking = HybridRanker::default().rank(&store, &vectors, &req).await.unwrap();

        assert_eq!(ids(&ranking), vec!["neither", "cats", "both"]);
        let top = &ranking.results()[0];
        assert_eq!(top.vector_score, Some(1.0));
        assert!((ranking.results()[1].vector_score.unwrap() - 0.6 / 0.9).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_blend_is_weighted_sum() {
        let store = pets_store();
        let vectors = FixedNeighbors(vec![hit("neither", 0.8)]);
        let req = RankRequest::new("cats dogs", "bio").with_alpha(0.5).with_embedding(&[0.0]);
        let ranking = HybridRanker::default().rank(&store, &vectors, &req).await.unwrap();

        let by_id: HashMap<&str, &ScoredChunk> =
            ranking.results().iter().map(|s| (s.chunk.id.as_str(), s)).collect();
        assert!((by_id["neither"].hybrid_score - 0.5).abs() < 1e-12);
        assert!((by_id["both"].hybrid_score - 0.5).abs() < 1e-12);
        assert_eq!(by_id["both"].vector_score, None);
        assert!(by_id["cats"].hybrid_score < 0.5);
        // Equal scores keep store order.
        assert_eq!(ids(&ranking)[..2], ["both", "neither"]);
    }

    #[tokio::test]
    async fn test_no_keyword_match_falls_back_to_vectors() {
        let store = pets_store();
        let vectors = FixedNeighbors(vec![hit("cats", 0.4), hit("neither", 0.2)]);
        let req = RankRequest::new("quantum chromodynamics", "bio").with_embedding(&[0.0]);
        let ranking = HybridRanker::default().rank(&store, &vectors, &req).await.unwrap();

        assert!(ranking.results().iter().all(|s| s.keyword_score == 0.0));
        assert_eq!(ids(&ranking), vec!["cats", "neither", "both"]);
    }

    #[tokio::test]
    async fn test_vector_failure_degrades_to_keywords() {
        let store = pets_store();
        let req = RankRequest::new("cats dogs", "bio").with_alpha(1.0).with_embedding(&[0.0]);
        let ranking = HybridRanker::default().rank(&store, &FailingVectors, &req).await.unwrap();

        assert!(ranking.is_degraded());
        assert_eq!(
            ranking.degraded_reason(),
            Some(&DegradedReason::TimedOut(Duration::from_millis(250)))
        );
        assert_eq!(ids(&ranking), vec!["both", "cats", "neither"]);
        assert!(ranking.results().iter().all(|s| s.vector_score.is_none()));
    }

    #[tokio::test]
    async fn test_missing_embedding_degrades() {
        let store = pets_store();
        let req = RankRequest::new("cats", "bio");
        let ranking = HybridRanker::default().rank(&store, &store, &req).await.unwrap();
        assert_eq!(
            ranking.degraded_reason(),
            Some(&DegradedReason::MissingQueryEmbedding)
        );
        assert!(!ranking.is_empty());
    }

    #[tokio::test]
    async fn test_never_leaves_scope_and_respects_limit() {
        let store = pets_store();
        let vectors = FixedNeighbors(vec![hit("elsewhere", 1.0), hit("cats", 0.5)]);
        let req = RankRequest::new("cats dogs", "bio").with_limit(2).with_embedding(&[0.0]);
        let ranking = HybridRanker::default().rank(&store, &vectors, &req).await.unwrap();

        assert_eq!(ranking.results().len(), 2);
        assert!(ranking.results().iter().all(|s| s.chunk.scope == "bio"));
    }

    #[tokio::test]
    async fn test_duplicate_text_ranked_independently() {
        let store = InMemoryStore::new();
        store
            .insert_chunks(vec![
                chunk("first", "s", "mitochondria produce energy", vec![1.0, 0.0]),
                chunk("second", "s", "mitochondria produce energy", vec![0.0, 1.0]),
            ])
            .unwrap();
        let req = RankRequest::new("mitochondria", "s").with_embedding(&[0.0, 1.0]);
        let ranking = HybridRanker::default().rank(&store, &store, &req).await.unwrap();

        assert_eq!(ids(&ranking), vec!["second", "first"]);
        let r = ranking.results();
        assert_eq!(r[0].keyword_score, r[1].keyword_score);
    }

    #[tokio::test]
    async fn test_single_chunk_scope() {
        let store = InMemoryStore::new();
        store.insert_chunks(vec![chunk("only", "s", "enzymes catalyse reactions", vec![1.0])]).unwrap();
        let req = RankRequest::new("enzymes", "s").with_embedding(&[1.0]);
        let ranking = HybridRanker::default().rank(&store, &store, &req).await.unwrap();
        assert_eq!(ids(&ranking), vec!["only"]);
        assert!((ranking.results()[0].hybrid_score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_scope_is_empty_not_error() {
        let store = pets_store();
        let req = RankRequest::new("cats", "history").with_embedding(&[0.0, 1.0]);
        let ranking = HybridRanker::default().rank(&store, &store, &req).await.unwrap();
        assert!(ranking.is_empty());
        assert!(!ranking.is_degraded());
    }

    #[tokio::test]
    async fn test_input_validation() {
        let store = pets_store();
        let ranker = HybridRanker::default();

        let blank = RankRequest::new("   ", "bio");
        assert!(matches!(ranker.rank(&store, &store, &blank).await, Err(RankError::EmptyQuery)));

        let zero = RankRequest::new("cats", "bio").with_limit(0);
        assert!(matches!(ranker.rank(&store, &store, &zero).await, Err(RankError::InvalidLimit)));

        let alpha = RankRequest::new("cats", "bio").with_alpha(1.5);
        assert!(matches!(ranker.rank(&store, &store, &alpha).await, Err(RankError::InvalidAlpha(_))));

        let nan = RankRequest::new("cats", "bio").with_alpha(f64::NAN);
        assert!(ranker.rank(&store, &store, &nan).await.is_err());
    }

    #[tokio::test]
    async fn test_store_failure_is_hard_error() {
        let req = RankRequest::new("cats", "bio").with_embedding(&[0.0]);
        let result = HybridRanker::default().rank(&FailingStore, &FailingVectors, &req).await;
        assert!(matches!(result, Err(RankError::Store(_))));
    }

    #[tokio::test]
    async fn test_candidate_count_is_limit_times_multiplier() {
        struct CountingVectors(std::sync::Mutex<Option<usize>>);

        #[async_trait]
        impl VectorSearch for CountingVectors {
            async fn nearest_neighbors(
                &self,
                _query_vec: &[f32],
                _scope: &str,
                k: usize,
            ) -> Result<Vec<Neighbor>, VectorSearchError> {
                *self.0.lock().unwrap() = Some(k);
                Ok(Vec::new())
            }
        }

        let store = pets_store();
        let vectors = CountingVectors(std::sync::Mutex::new(None));
        let req = RankRequest::new("cats", "bio").with_limit(7).with_embedding(&[0.0]);
        HybridRanker::default().rank(&store, &vectors, &req).await.unwrap();
        assert_eq!(*vectors.0.lock().unwrap(), Some(14));
    }

    #[test]
    fn test_response_shape() {
        let sc = ScoredChunk {
            chunk: chunk("c1", "s", "body", vec![]),
            keyword_score: 2.0,
            vector_score: Some(0.5),
            hybrid_score: 0.75,
        };
        let ranking = Ranking::Ranked(vec![sc]);
        let resp = ranking.to_response();
        assert_eq!(resp[0].chunk_id, "c1");
        assert_eq!(resp[0].source_label, "c1.pdf");
        assert_eq!(resp[0].hybrid_score, 0.75);
    }
}
