#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Approximate characters per token for English text. An approximation,
/// not an exact tokenizer.
pub const CHARS_PER_TOKEN: usize = 4;

/// Valid range for the target chunk size, in tokens. Values outside are
/// clamped, never rejected.
pub const MIN_TARGET_TOKENS: usize = 300;
pub const MAX_TARGET_TOKENS: usize = 800;

/// A contiguous span of a source document, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk text, trimmed of surrounding whitespace
    pub text: String,
    /// Zero-based index of this chunk within the document
    pub chunk_index: usize,
    /// Best-effort character offset into the source text. Approximate
    /// once overlap text is re-prepended; always `end_pos - text.len()`.
    pub start_pos: usize,
    /// Best-effort end offset (`start_pos + text.len()`)
    pub end_pos: usize,
}

/// Configuration for document chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens (clamped to 300-800 at chunk time)
    pub target_tokens: usize,
    /// Overlap carried from the end of one chunk into the next, in tokens
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_tokens: 500,
            overlap_tokens: 50,
        }
    }
}

/// Split text into paragraph-aligned chunks bounded by an approximate
/// token budget.
///
/// Paragraphs (maximal runs of non-blank lines) are greedily accumulated
/// until the character budget would be exceeded, at which point the
/// current chunk is closed and a new one is seeded with the trailing
/// overlap of the closed chunk. A single paragraph longer than the whole
/// budget is emitted as its own oversized chunk rather than split
/// mid-paragraph.
///
/// Pure and deterministic: the same input always yields the same chunks.
#[inline]
pub fn chunk_text(text: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<TextChunk> {
    let target = target_tokens.clamp(MIN_TARGET_TOKENS, MAX_TARGET_TOKENS);
    let budget_chars = target * CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;

    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut buffer = String::new();
    let mut buffer_start = 0usize;

    for (offset, paragraph) in split_paragraphs(text) {
        if !buffer.is_empty() && buffer.len() + paragraph.len() > budget_chars {
            // Close the current chunk and seed the next with its tail.
            let overlap = trailing_chars(&buffer, overlap_chars);
            push_chunk(&mut chunks, &buffer, buffer_start);

            if overlap.is_empty() {
                buffer_start = offset;
                buffer = paragraph;
            } else {
                buffer_start = offset.saturating_sub(overlap.len() + 2);
                buffer = format!("{overlap}\n\n{paragraph}");
            }
        } else if buffer.is_empty() {
            buffer_start = offset;
            buffer = paragraph;
        } else {
            buffer.push_str("\n\n");
            buffer.push_str(&paragraph);
        }
    }

    if !buffer.trim().is_empty() {
        push_chunk(&mut chunks, &buffer, buffer_start);
    }

    debug!(
        "Chunked {} chars into {} chunks (budget {} chars, overlap {} chars)",
        text.len(),
        chunks.len(),
        budget_chars,
        overlap_chars
    );

    chunks
}

fn push_chunk(chunks: &mut Vec<TextChunk>, buffer: &str, start_pos: usize) {
    let text = buffer.trim().to_string();
    let end_pos = start_pos + text.len();
    chunks.push(TextChunk {
        text,
        chunk_index: chunks.len(),
        start_pos,
        end_pos,
    });
}

/// Split text into paragraphs on blank-line boundaries, keeping the byte
/// offset where each paragraph begins. A blank line is any line that is
/// empty or whitespace-only.
fn split_paragraphs(text: &str) -> Vec<(usize, String)> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_start = 0usize;
    let mut offset = 0usize;

    for line in text.split('\n') {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push((current_start, current.join("\n").trim().to_string()));
                current.clear();
            }
        } else {
            if current.is_empty() {
                current_start = offset;
            }
            current.push(line);
        }
        offset += line.len() + 1;
    }

    if !current.is_empty() {
        paragraphs.push((current_start, current.join("\n").trim().to_string()));
    }

    paragraphs
}

/// The trailing `max_chars` characters of `text`, aligned to a char
/// boundary.
fn trailing_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(char_count - max_chars).collect()
}
