//! Paragraph-packing chunker.
//!
//! Text is split on blank lines and consecutive paragraphs are packed while
//! the estimated token count stays within `chunk_size`. A second pass merges
//! neighbouring chunks that still fit together. Paragraphs larger than the
//! budget on their own are cut at whitespace.

/// Rough token estimate: one token per four characters, at least one.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

const CHARS_PER_TOKEN: usize = 4;
const SEPARATOR: &str = "\n\n";

/// Splits documents into chunks of roughly `chunk_size` tokens.
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    chunk_size: usize,
}

impl ParagraphChunker {
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunk `text`. Empty or whitespace-only text yields no chunks.
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let paragraphs: Vec<String> = text
            .split(SEPARATOR)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .flat_map(|p| self.split_oversized(p))
            .collect();

        let mut packed: Vec<String> = Vec::new();
        let mut current = String::new();
        for paragraph in paragraphs {
            if current.is_empty() {
                current = paragraph;
                continue;
            }
            let candidate = format!("{current}{SEPARATOR}{paragraph}");
            if estimate_tokens(&candidate) <= self.chunk_size {
                current = candidate;
            } else {
                packed.push(std::mem::replace(&mut current, paragraph));
            }
        }
        if !current.is_empty() {
            packed.push(current);
        }

        let mut merged: Vec<String> = Vec::with_capacity(packed.len());
        for chunk in packed {
            match merged.last_mut() {
                Some(prev) if estimate_tokens(prev) + estimate_tokens(&chunk) <= self.chunk_size => {
                    prev.push_str(SEPARATOR);
                    prev.push_str(&chunk);
                }
                _ => merged.push(chunk),
            }
        }
        merged
    }

    /// Cut a paragraph that alone exceeds the budget, preferring whitespace.
    fn split_oversized(&self, paragraph: &str) -> Vec<String> {
        let max_chars = self.chunk_size * CHARS_PER_TOKEN;
        if paragraph.chars().count() <= max_chars {
            return vec![paragraph.to_string()];
        }

        let mut pieces = Vec::new();
        let mut rest = paragraph;
        while rest.chars().count() > max_chars {
            let limit = rest
                .char_indices()
                .nth(max_chars)
                .map_or(rest.len(), |(i, _)| i);
            let cut = rest[..limit]
                .rfind(char::is_whitespace)
                .filter(|&i| i > 0)
                .unwrap_or(limit);
            pieces.push(rest[..cut].trim().to_string());
            rest = rest[cut..].trim_start();
        }
        if !rest.is_empty() {
            pieces.push(rest.to_string());
        }
        pieces
    }
}

impl Default for ParagraphChunker {
    fn default() -> Self {
        Self::new(1200)
    }
}
