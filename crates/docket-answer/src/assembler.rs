//! Prompt building and extractive answers.
//!
//! Everything here is pure string work over [`ResolvedContext`]s; the service
//! decides which path runs.

use docket_core::{AnswerMode, AnswerSource, ResolvedContext};
use std::cmp::Ordering;

/// Message returned when retrieval produced nothing at all.
pub const NO_RESULTS: &str = "No relevant documents found.";

/// Size limits for prompts and extractive answers. Lengths are in characters.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Contexts included in a generation prompt
    pub prompt_contexts: usize,
    /// Leading sentences stitched into the summary
    pub summary_sentences: usize,
    pub summary_max_chars: usize,
    /// Citation or snippet entries listed under the summary
    pub citations: usize,
    pub snippet_chars: usize,
    /// Length of the summary taken from the best unfiltered candidate
    pub degenerate_chars: usize,
    /// Length used when a text has no sentence boundary
    pub sentence_fallback_chars: usize,
    /// Leading text of each context that is re-embedded for re-ranking
    pub rerank_window_chars: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            prompt_contexts: 5,
            summary_sentences: 3,
            summary_max_chars: 1000,
            citations: 5,
            snippet_chars: 800,
            degenerate_chars: 300,
            sentence_fallback_chars: 200,
            rerank_window_chars: 2000,
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn flatten_newlines(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Builds prompts and extractive answers.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    config: AssemblerConfig,
}

impl Assembler {
    #[must_use]
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Prompt for a generator: instructions, the question, and up to
    /// `prompt_contexts` numbered excerpts.
    #[must_use]
    pub fn build_prompt(&self, question: &str, contexts: &[ResolvedContext]) -> String {
        let excerpts: Vec<String> = contexts
            .iter()
            .take(self.config.prompt_contexts)
            .enumerate()
            .map(|(i, c)| format!("Source {} ({}):\n{}\n", i + 1, c.source_label(), c.document))
            .collect();

        format!(
            "You are an assistant helping summarize and answer questions using the provided document excerpts.\n\
             Use only the information in the excerpts. If the answer is not contained, say you don't know.\n\n\
             Question: {question}\n\n\
             Context excerpts:\n\
             {}\n\n\
             Provide a concise answer (2-4 sentences) and list sources by number.",
            excerpts.join("\n---\n")
        )
    }

    /// The leading text of a context that is embedded for re-ranking.
    #[must_use]
    pub fn rerank_window<'a>(&self, context: &'a ResolvedContext) -> &'a str {
        truncate_chars(&context.document, self.config.rerank_window_chars)
    }

    /// Order contexts by `scores` (parallel to `contexts`), highest first.
    ///
    /// The sort is stable, so equal scores keep retrieval order. NaN sorts last.
    #[must_use]
    pub fn rerank(&self, contexts: Vec<ResolvedContext>, scores: &[f32]) -> Vec<ResolvedContext> {
        let mut paired: Vec<(ResolvedContext, f32)> = contexts
            .into_iter()
            .zip(scores.iter().copied().chain(std::iter::repeat(f32::NAN)))
            .collect();
        paired.sort_by(|a, b| match (a.1.is_nan(), b.1.is_nan()) {
            (false, false) => b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal),
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (true, true) => Ordering::Equal,
        });
        paired.into_iter().map(|(c, _)| c).collect()
    }

    /// First sentence of `text`, newlines flattened.
    ///
    /// A sentence ends at `.`, `!` or `?` followed by whitespace. Without such
    /// a boundary the first `sentence_fallback_chars` characters are used.
    #[must_use]
    pub fn first_sentence(&self, text: &str) -> String {
        let flat = flatten_newlines(text);
        let flat = flat.trim();

        let mut chars = flat.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if matches!(c, '.' | '!' | '?')
                && chars.peek().is_some_and(|(_, next)| next.is_whitespace())
            {
                return flat[..idx + c.len_utf8()].trim().to_string();
            }
        }
        truncate_chars(flat, self.config.sentence_fallback_chars)
            .trim()
            .to_string()
    }

    /// Leading sentences of the top contexts, capped at `summary_max_chars`.
    #[must_use]
    pub fn summarize(&self, ranked: &[ResolvedContext]) -> String {
        let sentences: Vec<String> = ranked
            .iter()
            .take(self.config.summary_sentences)
            .map(|c| self.first_sentence(&c.document))
            .filter(|s| !s.is_empty())
            .collect();

        if sentences.is_empty() {
            return ranked
                .first()
                .map(|c| flatten_newlines(truncate_chars(&c.document, self.config.degenerate_chars)))
                .unwrap_or_default();
        }
        truncate_chars(&sentences.join(" "), self.config.summary_max_chars).to_string()
    }

    /// Extractive answer over already re-ranked contexts.
    ///
    /// With no contexts, `fallback` (the best unfiltered candidate) supplies a
    /// short summary without citations.
    #[must_use]
    pub fn extractive(
        &self,
        ranked: &[ResolvedContext],
        fallback: Option<&ResolvedContext>,
        mode: AnswerMode,
    ) -> (String, AnswerSource) {
        if ranked.is_empty() {
            let text = fallback
                .map(|c| {
                    flatten_newlines(truncate_chars(&c.document, self.config.degenerate_chars))
                        .trim()
                        .to_string()
                })
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| NO_RESULTS.to_string());
            return (text, AnswerSource::Degenerate);
        }

        let summary = self.summarize(ranked);
        let listed = ranked.iter().take(self.config.citations).enumerate();
        let text = match mode {
            AnswerMode::Compact => {
                let citations: Vec<String> = listed
                    .map(|(i, c)| {
                        format!("[{}] {} (chunk {})", i + 1, c.source_label(), c.chunk_label())
                    })
                    .collect();
                format!("{summary}\n\nSources:\n{}", citations.join("\n"))
            }
            AnswerMode::Detailed => {
                let snippets: Vec<String> = listed
                    .map(|(i, c)| {
                        let snippet = flatten_newlines(&c.document);
                        format!(
                            "[{}] {} (chunk {}): {}",
                            i + 1,
                            c.source_label(),
                            c.chunk_label(),
                            truncate_chars(&snippet, self.config.snippet_chars)
                        )
                    })
                    .collect();
                format!("{summary}\n\nDetails:\n{}", snippets.join("\n\n"))
            }
        };
        (text, AnswerSource::Extractive)
    }
}
