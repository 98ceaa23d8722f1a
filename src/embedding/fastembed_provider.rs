use super::EmbeddingProvider;
use crate::error::EmbeddingError;
use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;

/// FastEmbed-based embedding provider.
///
/// The model identifier is threaded in from configuration and recorded in
/// index metadata; it is never read from ambient global state.
pub struct FastEmbedProvider {
    // fastembed's embed takes &mut self; serialize access instead of
    // pretending the call is reentrant
    model: Mutex<TextEmbedding>,
    model_id: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a provider for the configured model name
    pub fn from_name(model_name: &str) -> Result<Self> {
        let (model, dimension) = resolve_model(model_name)?;
        tracing::info!(
            "Initializing FastEmbed model {} ({}d)",
            model_name,
            dimension
        );

        let mut options = InitOptions::default();
        options.model_name = model;
        options.show_download_progress = false;

        let embedding_model = TextEmbedding::try_new(options)
            .with_context(|| format!("Failed to initialize embedding model '{}'", model_name))?;

        Ok(Self {
            model: Mutex::new(embedding_model),
            model_id: model_name.to_string(),
            dimension,
        })
    }
}

fn resolve_model(model_name: &str) -> Result<(EmbeddingModel, usize)> {
    let resolved = match model_name {
        "all-MiniLM-L6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "all-MiniLM-L12-v2" => (EmbeddingModel::AllMiniLML12V2, 384),
        "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        other => {
            return Err(EmbeddingError::InitializationFailed(format!(
                "Unknown embedding model '{}'; supported: all-MiniLM-L6-v2, all-MiniLM-L12-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                other
            ))
            .into());
        }
    };
    Ok(resolved)
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut model = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::LockPoisoned(e.to_string()))?;

        let embeddings = model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationFailed(format!("{:#}", e)))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                }
                .into());
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        assert_eq!(resolve_model("all-MiniLM-L6-v2").unwrap().1, 384);
        assert_eq!(resolve_model("bge-base-en-v1.5").unwrap().1, 768);
    }

    #[test]
    fn test_resolve_unknown_model_lists_choices() {
        let err = resolve_model("made-up-model").unwrap_err();
        assert!(format!("{:#}", err).contains("all-MiniLM-L6-v2"));
    }

    // Tests below download model weights on first run
    #[test]
    #[ignore = "requires model download"]
    fn test_embedding_generation() {
        let provider = FastEmbedProvider::from_name("all-MiniLM-L6-v2").unwrap();
        let texts = vec![
            "fn main() { println!(\"Hello, world!\"); }".to_string(),
            "pub struct Vector { x: f32, y: f32 }".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 384);
        assert_eq!(embeddings[1].len(), 384);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_empty_batch() {
        let provider = FastEmbedProvider::from_name("all-MiniLM-L6-v2").unwrap();
        let embeddings = provider.embed_batch(&[]).unwrap();
        assert_eq!(embeddings.len(), 0);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_identity() {
        let provider = FastEmbedProvider::from_name("all-MiniLM-L6-v2").unwrap();
        assert_eq!(provider.dimension(), 384);
        assert_eq!(provider.model_id(), "all-MiniLM-L6-v2");
    }
}
