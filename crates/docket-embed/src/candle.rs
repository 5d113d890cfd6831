//! Local sentence embeddings with Candle.
//!
//! Runs `sentence-transformers/all-MiniLM-L6-v2`:
//! - 384 dimensions
//! - 256 token window (longer inputs are truncated)
//! - mean pooling over the attention mask

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use docket_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use hf_hub::api::tokio::ApiBuilder;
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;
use tokenizers::{Tokenizer, TruncationParams};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
const EMBEDDING_DIM: usize = 384;
const MAX_TOKENS: usize = 256;

fn inference<T>(result: candle_core::Result<T>, step: &str) -> Result<T, EmbedError> {
    result.map_err(|e| EmbedError::Inference(format!("{step}: {e}")))
}

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
}

/// MiniLM embedder, downloaded from the Hugging Face Hub on first use.
pub struct CandleEmbedder {
    device: Device,
    cache_dir: PathBuf,
    loaded: OnceCell<LoadedModel>,
}

impl CandleEmbedder {
    /// Create an embedder caching model files under `cache_dir`.
    pub fn new(cache_dir: PathBuf) -> Self {
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
        info!("CandleEmbedder using device: {:?}", device);
        Self {
            device,
            cache_dir,
            loaded: OnceCell::new(),
        }
    }

    /// Download (if needed) and load the model. Called lazily by `embed_text`.
    pub async fn init(&self) -> Result<(), EmbedError> {
        self.model().await.map(|_| ())
    }

    async fn model(&self) -> Result<&LoadedModel, EmbedError> {
        self.loaded.get_or_try_init(|| self.load()).await
    }

    async fn load(&self) -> Result<LoadedModel, EmbedError> {
        info!("Loading embedding model {}", MODEL_ID);

        let api = ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .build()
            .map_err(|e| EmbedError::ModelLoad(format!("hub client: {e}")))?;
        let repo = api.repo(Repo::new(MODEL_ID.to_string(), RepoType::Model));

        let mut files = Vec::with_capacity(3);
        for name in ["tokenizer.json", "config.json", "model.safetensors"] {
            debug!("Fetching {}", name);
            let path = repo
                .get(name)
                .await
                .map_err(|e| EmbedError::ModelLoad(format!("download {name}: {e}")))?;
            files.push(path);
        }

        let mut tokenizer = Tokenizer::from_file(&files[0])
            .map_err(|e| EmbedError::ModelLoad(format!("tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..TruncationParams::default()
            }))
            .map_err(|e| EmbedError::ModelLoad(format!("tokenizer truncation: {e}")))?;
        tokenizer.with_padding(None);

        let config: Config = std::fs::read_to_string(&files[1])
            .map_err(|e| EmbedError::ModelLoad(format!("read config: {e}")))
            .and_then(|s| {
                serde_json::from_str(&s)
                    .map_err(|e| EmbedError::ModelLoad(format!("parse config: {e}")))
            })?;

        // SAFETY: the weights file is only read, and the hub cache is not
        // modified while the mapping is alive.
        #[allow(unsafe_code)]
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&files[2..], DType::F32, &self.device)
                .map_err(|e| EmbedError::ModelLoad(format!("weights: {e}")))?
        };
        let model = BertModel::load(vb, &config)
            .map_err(|e| EmbedError::ModelLoad(format!("build model: {e}")))?;

        info!("Embedding model ready");
        Ok(LoadedModel { model, tokenizer })
    }

    fn encode(
        &self,
        loaded: &LoadedModel,
        texts: &[&str],
        normalize: bool,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let encodings = loaded
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbedError::Inference(format!("tokenize: {e}")))?;

        let width = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0).max(1);
        let rows = texts.len();
        let mut ids = vec![0u32; rows * width];
        let mut mask = vec![0u32; rows * width];
        let mut token_counts = Vec::with_capacity(rows);
        for (row, encoding) in encodings.iter().enumerate() {
            let tokens = encoding.get_ids();
            token_counts.push(tokens.len());
            let offset = row * width;
            ids[offset..offset + tokens.len()].copy_from_slice(tokens);
            mask[offset..offset + tokens.len()].fill(1);
        }

        let input_ids = inference(Tensor::from_vec(ids, (rows, width), &self.device), "input ids")?;
        let attention = inference(Tensor::from_vec(mask, (rows, width), &self.device), "mask")?;
        let token_types = inference(input_ids.zeros_like(), "token types")?;

        let hidden = inference(
            loaded.model.forward(&input_ids, &token_types, Some(&attention)),
            "forward",
        )?;

        // Mean over unmasked positions.
        let mask = inference(
            attention.to_dtype(DType::F32).and_then(|m| m.unsqueeze(2)),
            "mask cast",
        )?;
        let summed = inference(hidden.broadcast_mul(&mask).and_then(|t| t.sum(1)), "pool sum")?;
        let counts = inference(mask.sum(1).and_then(|c| c.clamp(1e-9, f64::MAX)), "pool count")?;
        let mut pooled = inference(summed.broadcast_div(&counts), "pool mean")?;

        if normalize {
            let norms = inference(
                pooled
                    .sqr()
                    .and_then(|t| t.sum_keepdim(1))
                    .and_then(|t| t.sqrt())
                    .and_then(|t| t.clamp(1e-12, f64::MAX)),
                "norm",
            )?;
            pooled = inference(pooled.broadcast_div(&norms), "normalize")?;
        }

        let vectors = inference(pooled.to_vec2::<f32>(), "to vec")?;
        Ok(vectors
            .into_iter()
            .zip(token_counts)
            .map(|(embedding, token_count)| EmbeddingOutput {
                embedding,
                token_count,
            })
            .collect())
    }
}

#[async_trait]
impl Embedder for CandleEmbedder {
    fn model_name(&self) -> &str {
        MODEL_ID
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let loaded = self.model().await?;

        let mut outputs = Vec::with_capacity(texts.len());
        for batch in texts.chunks(config.batch_size.max(1)) {
            outputs.extend(self.encode(loaded, batch, config.normalize)?);
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    #[ignore] // downloads the model
    async fn test_candle_embedder_similarity() {
        let cache = tempdir().unwrap();
        let embedder = CandleEmbedder::new(cache.path().to_path_buf());
        let config = EmbeddingConfig::default();

        let outputs = embedder
            .embed_text(
                &["The court granted the motion.", "The motion was granted by the judge.", "Banana bread recipe"],
                &config,
            )
            .await
            .unwrap();

        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].embedding.len(), EMBEDDING_DIM);
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        let norm = dot(&outputs[0].embedding, &outputs[0].embedding).sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
        assert!(
            dot(&outputs[0].embedding, &outputs[1].embedding)
                > dot(&outputs[0].embedding, &outputs[2].embedding)
        );
    }
}
