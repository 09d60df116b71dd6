//! BM25 keyword scoring over every chunk in a scope.
//!
//! # Scoring
//!
//! For each query term `t` and chunk `d` in a scope of `N` chunks:
//!
//! ```text
//! idf(t)   = ln((N - df + 0.5) / (df + 0.5) + 1)
//! score(d) = Σ idf(t) · tf·(k1 + 1) / (tf + k1·(1 - b + b·|d| / avg|d|))
//! ```
//!
//! `tf` counts whole-word occurrences (`cat` does not match `category`),
//! while `df` counts chunks containing the term as a substring. The two
//! matchers differ on purpose: ranking parity with the deployed scorer
//! depends on it.

use crate::models::Chunk;

/// BM25 tuning constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Document-length normalization (0 = none, 1 = full).
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split a query into lower-cased terms.
///
/// Tokens are whitespace-separated, stripped of non-word characters, and
/// dropped when shorter than 2 characters. Repeated terms are kept.
///
/// ```rust
/// use studylens_core::keyword::tokenize_query;
///
/// assert_eq!(tokenize_query("Cats, dogs & a bird!"), vec!["cats", "dogs", "bird"]);
/// ```
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|tok| tok.chars().filter(|c| is_word_char(*c)).collect::<String>())
        .filter(|tok| tok.chars().count() >= 2)
        .collect()
}

/// Count whole-word, case-insensitive occurrences of `term` in `text`.
///
/// `term` is expected to be lower-case and consist of word characters only,
/// as produced by [`tokenize_query`].
pub fn term_frequency(text: &str, term: &str) -> usize {
    text.to_lowercase()
        .split(|c: char| !is_word_char(c))
        .filter(|word| *word == term)
        .count()
}

/// Case-insensitive substring containment, used for document frequency.
pub fn contains_term(text: &str, term: &str) -> bool {
    text.to_lowercase().contains(term)
}

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Scores whole scopes with BM25.
#[derive(Debug, Clone, Default)]
pub struct Bm25Scorer {
    params: Bm25Params,
}

impl Bm25Scorer {
    pub fn new(params: Bm25Params) -> Self {
        Self { params }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// Score every chunk against the query terms.
    ///
    /// Returns one score per chunk, in input order. All scores are zero when
    /// no term matches or `terms` is empty.
    pub fn score_all(&self, terms: &[String], chunks: &[Chunk]) -> Vec<f64> {
        if chunks.is_empty() {
            return Vec::new();
        }

        let lowered: Vec<String> = chunks.iter().map(|c| c.text.to_lowercase()).collect();
        let doc_lens: Vec<f64> = chunks.iter().map(|c| word_count(&c.text) as f64).collect();
        let n = chunks.len() as f64;
        let avg_len = doc_lens.iter().sum::<f64>() / n;

        let idfs: Vec<f64> = terms
            .iter()
            .map(|term| {
                let df = lowered.iter().filter(|text| text.contains(term.as_str())).count() as f64;
                ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
            })
            .collect();

        let Bm25Params { k1, b } = self.params;

        lowered
            .iter()
            .zip(doc_lens.iter())
            .map(|(text, &doc_len)| {
                let mut score = 0.0;
                for (term, idf) in terms.iter().zip(idfs.iter()) {
                    let tf = term_frequency(text, term) as f64;
                    if tf == 0.0 {
                        continue;
                    }
                    let norm = 1.0 - b + b * (doc_len / avg_len);
                    score += idf * (tf * (k1 + 1.0)) / (tf + k1 * norm);
                }
                score
            })
            .collect()
    }
}
