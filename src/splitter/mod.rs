//! Recursive character text splitter.
//!
//! Text is split on the first separator it contains (paragraph, line,
//! word, then single characters) and the pieces are merged back into
//! chunks of at most `chunk_size` characters. Consecutive chunks share up
//! to `chunk_overlap` characters of trailing context.

use crate::error::{RagError, RagResult};
use crate::loader::Document;
use std::path::PathBuf;

pub const DEFAULT_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// A bounded slice of a document, the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Source document path, relative to the snapshot root
    pub source: PathBuf,
    /// Position of this chunk within its document
    pub index: usize,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> RagResult<Self> {
        if chunk_size == 0 || chunk_overlap > chunk_size {
            return Err(RagError::Config(format!(
                "invalid splitter settings: chunk size {}, overlap {}",
                chunk_size, chunk_overlap
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split every document, preserving document order.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .enumerate()
                    .map(|(index, content)| Chunk {
                        source: doc.path.clone(),
                        index,
                        content,
                    })
            })
            .collect();

        tracing::info!(
            "Split {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // The empty separator always matches, so there is always a pick
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len() - 1);
        let separator = separators[position];
        let remaining = &separators[position + 1..];

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Greedily merge small splits into chunks, carrying a tail of up to
    /// `chunk_overlap` characters into the next chunk.
    fn merge(&self, splits: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: Vec<(&str, usize)> = Vec::new();
        let mut total = 0;

        for split in splits {
            let len = char_len(split);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap
                    || (total > 0 && total + len > self.chunk_size)
                {
                    let (_, first_len) = window.remove(0);
                    total -= first_len;
                }
            }
            window.push((split.as_str(), len));
            total += len;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &[(&str, usize)]) {
    let joined: String = window.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split `text` on `separator`, attaching each separator to the start of
/// the piece that follows it. Empty pieces are dropped.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    for (i, part) in text.split(separator).enumerate() {
        let piece = if i == 0 {
            part.to_string()
        } else {
            format!("{}{}", separator, part)
        };
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str, content: &str) -> Document {
        Document {
            path: PathBuf::from(path),
            content: content.to_string(),
            encoding: "utf-8",
        }
    }

    fn numbered_lines(count: usize) -> String {
        (0..count)
            .map(|i| format!("line number {:04} with some padding text", i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let splitter = TextSplitter::default();
        assert_eq!(splitter.split_text("Hello world project."), vec!["Hello world project."]);
    }

    #[test]
    fn test_empty_inputs() {
        let splitter = TextSplitter::default();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text(" \n\n \n").is_empty());
        assert!(splitter.split_documents(&[]).is_empty());
    }

    #[test]
    fn test_chunks_are_bounded_and_overlap() {
        let splitter = TextSplitter::new(200, 50).unwrap();
        let text = numbered_lines(40);
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200, "chunk too long: {}", chunk.len());
        }
        for pair in chunks.windows(2) {
            let last_line = pair[0].lines().last().unwrap();
            assert!(
                pair[1].starts_with(last_line),
                "expected '{}' to carry over into the next chunk",
                last_line
            );
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let splitter = TextSplitter::new(60, 0).unwrap();
        let text = "first paragraph of text\n\nsecond paragraph of text\n\nthird paragraph of text";
        let chunks = splitter.split_text(text);
        assert_eq!(
            chunks,
            vec![
                "first paragraph of text\n\nsecond paragraph of text",
                "third paragraph of text",
            ]
        );
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let splitter = TextSplitter::new(100, 10).unwrap();
        let text = "x".repeat(250);
        let chunks = splitter.split_text(&text);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 100));
        assert_eq!(chunks[0].len(), 100);
    }

    #[test]
    fn test_multibyte_text_counts_characters() {
        let splitter = TextSplitter::new(10, 2).unwrap();
        let text = "é".repeat(25);
        let chunks = splitter.split_text(&text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_split_is_deterministic() {
        let splitter = TextSplitter::default();
        let docs = vec![doc("a.py", &numbered_lines(300)), doc("b.md", "short")];
        assert_eq!(splitter.split_documents(&docs), splitter.split_documents(&docs));
    }

    #[test]
    fn test_chunks_keep_source_and_index() {
        let splitter = TextSplitter::new(100, 0).unwrap();
        let docs = vec![doc("a.py", &numbered_lines(10)), doc("b.md", "short")];
        let chunks = splitter.split_documents(&docs);

        let last = chunks.last().unwrap();
        assert_eq!(last.source, PathBuf::from("b.md"));
        assert_eq!(last.index, 0);
        assert!(chunks[..chunks.len() - 1]
            .iter()
            .enumerate()
            .all(|(i, c)| c.source == PathBuf::from("a.py") && c.index == i));
    }

    #[test]
    fn test_rejects_overlap_larger_than_size() {
        assert!(TextSplitter::new(100, 200).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }
}
