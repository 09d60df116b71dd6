//! Paragraph-boundary chunker with trailing overlap.
//!
//! Splits an ingested document into [`TextChunk`]s of at most roughly
//! `max_tokens` tokens. Each chunk after the first starts with the last
//! `overlap_chars` characters of its predecessor so context is not lost at
//! the seam.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` to `max_chars` using a 4 chars/token ratio.
//! 2. Split text on `\n\n` paragraph boundaries; hard-split any paragraph
//!    longer than `max_chars` at the last whitespace that fits.
//! 3. Accumulate paragraphs until the next one would overflow, then flush
//!    and seed the next buffer with the overlap tail.
//! 4. Always return at least one chunk (even for empty text).
//!
//! Chunks get a random UUID and a SHA-256 hash of their text. Embeddings are
//! attached later by the ingestion caller via [`TextChunk::into_chunk`].
//!
//! ```rust
//! use studylens_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("doc-1", "Cells divide.\n\nMitosis has phases.", 1000, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

const CHARS_PER_TOKEN: usize = 4;

/// A chunk of document text awaiting its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

impl TextChunk {
    /// Attach scope, citation label, and embedding to produce a storable [`Chunk`].
    pub fn into_chunk(self, scope: &str, source_label: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: self.id,
            scope: scope.to_string(),
            document_id: self.document_id,
            chunk_index: self.chunk_index,
            source_label: source_label.to_string(),
            text: self.text,
            hash: self.hash,
            embedding,
        }
    }
}

/// Split `text` into chunks of at most ~`max_tokens` tokens.
///
/// `overlap_chars` is capped at half the chunk size. Indices are contiguous
/// from 0.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    max_tokens: usize,
    overlap_chars: usize,
) -> Vec<TextChunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap = overlap_chars.min(max_chars / 2);

    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        for segment in split_oversized(para, max_chars) {
            let would_be = if buf.is_empty() {
                segment.len()
            } else {
                buf.len() + 2 + segment.len()
            };
            if would_be > max_chars && !buf.is_empty() {
                let tail = overlap_tail(&buf, overlap).to_string();
                pieces.push(std::mem::take(&mut buf));
                buf.push_str(&tail);
            }
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(segment);
        }
    }

    if !buf.trim().is_empty() {
        pieces.push(buf);
    }
    if pieces.is_empty() {
        pieces.push(text.trim().to_string());
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, body)| make_chunk(document_id, i as i64, body))
        .collect()
}

/// Hard-split a paragraph longer than `max_chars` at whitespace boundaries.
fn split_oversized(para: &str, max_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = para;
    while rest.len() > max_chars {
        let limit = snap_to_char_boundary(rest, max_chars);
        let mut cut = rest[..limit]
            .rfind(char::is_whitespace)
            .filter(|&p| p > 0)
            .unwrap_or(limit);
        if cut == 0 {
            cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        let piece = rest[..cut].trim();
        if !piece.is_empty() {
            out.push(piece);
        }
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// The last ~`overlap` bytes of `s`, starting on a word boundary when possible.
fn overlap_tail(s: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    if s.len() <= overlap {
        return s.trim();
    }
    let mut start = s.len() - overlap;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    let tail = &s[start..];
    match tail.find(char::is_whitespace) {
        Some(ws) => tail[ws..].trim(),
        None => tail.trim(),
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(document_id: &str, index: i64, text: String) -> TextChunk {
    let hash = format!("{:x}", Sha256::digest(text.as_bytes()));
    TextChunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text,
        hash,
    }
}
