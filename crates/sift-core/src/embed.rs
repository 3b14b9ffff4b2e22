//! Embedding generation using fastembed

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::{Config, Result, SiftError};

/// Turns text into fixed-size, normalized vectors.
pub trait Embed {
    /// Identifier of the embedding space; vectors from different ids are not comparable.
    fn model_id(&self) -> &str;

    /// Vector dimension.
    fn dimension(&self) -> usize;

    /// Generate embeddings for a batch of texts, one vector per text.
    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Generate embedding for a single text.
    fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| SiftError::Embedding("No embedding generated".to_string()))
    }
}

/// Wrapper around fastembed. The model is loaded on the first embed call.
pub struct Embedder {
    name: String,
    model_type: EmbeddingModel,
    dimension: usize,
    model: Option<TextEmbedding>,
}

impl Embedder {
    /// Create a new embedder for the model specified in config.
    pub fn new(config: &Config) -> Result<Self> {
        let (model_type, dimension) = match config.model.as_str() {
            // Code-optimized model
            "jina-embeddings-v2-base-code" => (EmbeddingModel::JinaEmbeddingsV2BaseCode, 768),
            // General-purpose models
            "all-MiniLM-L6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "all-MiniLM-L12-v2" => (EmbeddingModel::AllMiniLML12V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            other => {
                return Err(SiftError::Embedding(format!(
                    "Unknown model: {}. Supported: all-MiniLM-L6-v2, all-MiniLM-L12-v2, bge-small-en-v1.5, bge-base-en-v1.5, jina-embeddings-v2-base-code",
                    other
                )));
            }
        };

        Ok(Self {
            name: config.model.clone(),
            model_type,
            dimension,
            model: None,
        })
    }

    fn model(&mut self) -> Result<&TextEmbedding> {
        if self.model.is_none() {
            tracing::debug!("Loading embedding model {}", self.name);
            let model = TextEmbedding::try_new(
                InitOptions::new(self.model_type.clone()).with_show_download_progress(true),
            )
            .map_err(|e| SiftError::Embedding(e.to_string()))?;
            self.model = Some(model);
        }
        self.model
            .as_ref()
            .ok_or_else(|| SiftError::Embedding("Model not loaded".to_string()))
    }
}

impl Embed for Embedder {
    fn model_id(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model()?
            .embed(texts.to_vec(), None)
            .map_err(|e| SiftError::Embedding(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(SiftError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}
