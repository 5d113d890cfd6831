//! Question answering: retrieve, then generate or extract.

use docket_core::{Answer, AnswerMode, AnswerSource, Error, Filter, Generator, ResolvedContext};
use docket_query::{cosine_similarity, Retrieval, Retriever};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::assembler::Assembler;

/// One question against one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub collection: String,
    pub top_k: usize,
    #[serde(default)]
    pub mode: AnswerMode,
    #[serde(default)]
    pub filter: Filter,
}

/// Parameters for generator calls.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Deadline for a whole completion
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.0,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Answers questions over a [`Retriever`].
pub struct AnswerService {
    retriever: Arc<Retriever>,
    assembler: Assembler,
    generator: Option<Arc<dyn Generator>>,
    settings: GenerationSettings,
}

impl AnswerService {
    /// A service that always answers extractively.
    pub fn new(retriever: Arc<Retriever>, assembler: Assembler) -> Self {
        Self {
            retriever,
            assembler,
            generator: None,
            settings: GenerationSettings::default(),
        }
    }

    /// Try `generator` first and fall back to extraction when it fails.
    #[must_use]
    pub fn with_generator(
        mut self,
        generator: Arc<dyn Generator>,
        settings: GenerationSettings,
    ) -> Self {
        self.generator = Some(generator);
        self.settings = settings;
        self
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Answer a question.
    ///
    /// Fails only when the question cannot be embedded.
    pub async fn ask(&self, request: &AskRequest) -> Result<Answer, Error> {
        let retrieval = self
            .retriever
            .retrieve(
                &request.collection,
                &request.question,
                request.top_k,
                &request.filter,
            )
            .await?;
        Ok(self
            .answer_from(&request.question, retrieval, request.mode)
            .await)
    }

    /// Answer from an existing retrieval.
    pub async fn answer_from(
        &self,
        question: &str,
        retrieval: Retrieval,
        mode: AnswerMode,
    ) -> Answer {
        let Retrieval {
            query_embedding,
            candidates,
            contexts,
        } = retrieval;

        if contexts.is_empty() {
            let (text, source) = self
                .assembler
                .extractive(&[], candidates.first(), mode);
            debug!("No contexts survived filtering; {} candidates", candidates.len());
            return Answer {
                text,
                mode,
                source,
                contexts,
            };
        }

        if let Some(text) = self.generate(question, &contexts).await {
            return Answer {
                text,
                mode,
                source: AnswerSource::Generated,
                contexts,
            };
        }

        let scores = self.rerank_scores(&query_embedding, &contexts).await;
        let ranked = self.assembler.rerank(contexts, &scores);
        let (text, source) = self.assembler.extractive(&ranked, None, mode);
        Answer {
            text,
            mode,
            source,
            contexts: ranked,
        }
    }

    /// Generator output, or `None` when there is no generator or it failed.
    async fn generate(&self, question: &str, contexts: &[ResolvedContext]) -> Option<String> {
        let generator = self.generator.as_ref()?;
        let prompt = self.assembler.build_prompt(question, contexts);

        let outcome = tokio::time::timeout(
            self.settings.timeout,
            generator.complete(&prompt, self.settings.max_tokens, self.settings.temperature),
        )
        .await;

        match outcome {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                info!("Answered with {}", generator.model_name());
                Some(text.trim().to_string())
            }
            Ok(Ok(_)) => {
                warn!("{} returned an empty answer, answering locally", generator.model_name());
                None
            }
            Ok(Err(e)) => {
                warn!("Generation failed ({}), answering locally", e);
                None
            }
            Err(_) => {
                warn!(
                    "Generation exceeded {:?}, answering locally",
                    self.settings.timeout
                );
                None
            }
        }
    }

    /// Similarity of each context's leading text to the query.
    ///
    /// Falls back to the retrieval scores if the texts cannot be embedded.
    async fn rerank_scores(&self, query: &[f32], contexts: &[ResolvedContext]) -> Vec<f32> {
        let windows: Vec<&str> = contexts
            .iter()
            .map(|c| self.assembler.rerank_window(c))
            .collect();

        match self.retriever.embedder().embed_batch(&windows).await {
            Ok(outputs) => outputs
                .iter()
                .map(|o| cosine_similarity(query, &o.embedding))
                .collect(),
            Err(e) => {
                warn!("Re-ranking embeddings failed ({}), using retrieval scores", e);
                contexts.iter().map(|c| c.score).collect()
            }
        }
    }
}
