//! Embedding provider abstraction.
//!
//! The index treats the model as an opaque batch text-to-vector function
//! tagged with a model identifier and fixed dimensionality; both are
//! recorded in index metadata and drive full invalidation on change.

mod fastembed_provider;

pub use fastembed_provider::FastEmbedProvider;

use anyhow::Result;

/// Trait for embedding generation
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts, one vector per text
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the dimension of the embeddings
    fn dimension(&self) -> usize;

    /// Get the model identifier recorded for invalidation
    fn model_id(&self) -> &str;
}

/// Embed a batch with retry at finer granularity on failure.
///
/// A failed batch is split in half and retried recursively down to single
/// texts, so one poisoned input drops only itself; embeddings that already
/// succeeded are never discarded. Returns one slot per input text, `None`
/// where embedding ultimately failed.
pub fn embed_resilient(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Vec<Option<Vec<f32>>> {
    if texts.is_empty() {
        return Vec::new();
    }

    match provider.embed_batch(texts) {
        Ok(vectors) if vectors.len() == texts.len() => vectors.into_iter().map(Some).collect(),
        Ok(vectors) if texts.len() == 1 => {
            tracing::warn!(
                "Embedding returned {} vectors for one text, dropping it",
                vectors.len()
            );
            vec![None]
        }
        Ok(vectors) => {
            tracing::warn!(
                "Embedding batch returned {} vectors for {} texts, splitting",
                vectors.len(),
                texts.len()
            );
            split_and_retry(provider, texts)
        }
        Err(e) if texts.len() == 1 => {
            tracing::warn!("Embedding failed for one text, dropping it: {:#}", e);
            vec![None]
        }
        Err(e) => {
            tracing::debug!(
                "Embedding batch of {} failed, retrying halves: {:#}",
                texts.len(),
                e
            );
            split_and_retry(provider, texts)
        }
    }
}

fn split_and_retry(provider: &dyn EmbeddingProvider, texts: &[String]) -> Vec<Option<Vec<f32>>> {
    let mid = texts.len() / 2;
    let mut result = embed_resilient(provider, &texts[..mid]);
    result.extend(embed_resilient(provider, &texts[mid..]));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that fails whole batches containing a poisoned text but
    /// succeeds on singles, counting calls
    struct FlakyProvider {
        calls: AtomicUsize,
        poison: String,
        fail_even_single: bool,
    }

    impl EmbeddingProvider for FlakyProvider {
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t == &self.poison)
                && (texts.len() > 1 || self.fail_even_single)
            {
                anyhow::bail!("poisoned batch");
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "flaky-test-model"
        }
    }

    #[test]
    fn test_embed_resilient_clean_batch() {
        let provider = FlakyProvider {
            calls: AtomicUsize::new(0),
            poison: "#".to_string(),
            fail_even_single: false,
        };
        let texts = vec!["a".to_string(), "bb".to_string()];
        let result = embed_resilient(&provider, &texts);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].as_ref().unwrap()[0], 1.0);
        assert_eq!(result[1].as_ref().unwrap()[0], 2.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_embed_resilient_recovers_around_poison() {
        let provider = FlakyProvider {
            calls: AtomicUsize::new(0),
            poison: "bad".to_string(),
            fail_even_single: false,
        };
        let texts: Vec<String> = ["a", "bad", "c", "d"].iter().map(|s| s.to_string()).collect();
        let result = embed_resilient(&provider, &texts);
        assert_eq!(result.len(), 4);
        // Singles succeed in this provider, so everything embeds eventually
        assert!(result.iter().all(|r| r.is_some()));
    }

    #[test]
    fn test_embed_resilient_drops_only_failed_text() {
        let provider = FlakyProvider {
            calls: AtomicUsize::new(0),
            poison: "bad".to_string(),
            fail_even_single: true,
        };
        let texts: Vec<String> = ["a", "bad", "c", "d"].iter().map(|s| s.to_string()).collect();
        let result = embed_resilient(&provider, &texts);
        assert_eq!(result.len(), 4);
        assert!(result[0].is_some());
        assert!(result[1].is_none());
        assert!(result[2].is_some());
        assert!(result[3].is_some());
    }

    /// Provider that claims success but never returns enough vectors
    struct ShortProvider {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for ShortProvider {
        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "short-test-model"
        }
    }

    #[test]
    fn test_embed_resilient_short_batch_terminates() {
        let provider = ShortProvider {
            calls: AtomicUsize::new(0),
        };

        let single = vec!["a".to_string()];
        assert_eq!(embed_resilient(&provider, &single), vec![None]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let texts: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let result = embed_resilient(&provider, &texts);
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|r| r.is_none()));
    }

    #[test]
    fn test_embed_resilient_empty() {
        let provider = FlakyProvider {
            calls: AtomicUsize::new(0),
            poison: String::new(),
            fail_even_single: false,
        };
        assert!(embed_resilient(&provider, &[]).is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
