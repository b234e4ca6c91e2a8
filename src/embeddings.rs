use crate::error::{with_timeout, RagError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Embedding { values }
    }

    pub fn dimensions(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity with another embedding; 0.0 if either has zero
    /// magnitude or the result is not a finite number
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();
        let norm_a = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b = other.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        let similarity = dot / (norm_a * norm_b);
        if similarity.is_finite() {
            similarity
        } else {
            0.0
        }
    }
}

/// A service that maps text to fixed-size vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for several texts, in input order.
    /// Backends with a native batch endpoint should override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Dimensionality of every embedding this service returns
    fn dimensions(&self) -> usize;
}

/// How index builds talk to the embedding service
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    pub request_timeout: Duration,
}

/// Embed many texts with at most `concurrency` batch requests in flight.
///
/// Output order matches `texts`. The first failing batch aborts the whole call.
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    options: BatchOptions,
) -> Result<Vec<Embedding>> {
    let batch_size = options.batch_size.max(1);
    debug!(
        "Embedding {} texts in batches of {} ({} concurrent)",
        texts.len(),
        batch_size,
        options.concurrency
    );

    let batches: Vec<Vec<Embedding>> = stream::iter(texts.chunks(batch_size))
        .map(|batch| async move {
            let embeddings = with_timeout(
                "embedding",
                options.request_timeout,
                embedder.embed_batch(batch),
            )
            .await?;
            if embeddings.len() != batch.len() {
                return Err(RagError::EmbeddingService(format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    embeddings.len()
                )));
            }
            Ok::<_, RagError>(embeddings)
        })
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds a text as [length, batch number] and tracks peak concurrency
    struct CountingEmbedder {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        batches: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            CountingEmbedder {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                batches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Embedding> {
            Ok(Embedding::new(vec![text.len() as f32, 0.0]))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let batch = self.batches.fetch_add(1, Ordering::SeqCst) as f32;
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| Embedding::new(vec![t.len() as f32, batch]))
                .collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![2.0, 0.0]);
        let c = Embedding::new(vec![0.0, 3.0]);
        let zero = Embedding::new(vec![0.0, 0.0]);

        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
        assert!(a.cosine_similarity(&c).abs() < 1e-6);
        assert_eq!(a.cosine_similarity(&zero), 0.0);
    }

    #[test]
    fn test_non_finite_similarity_is_zero() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let nan = Embedding::new(vec![f32::NAN, 1.0]);
        let infinite = Embedding::new(vec![f32::INFINITY, 0.0]);

        assert_eq!(a.cosine_similarity(&nan), 0.0);
        assert_eq!(nan.cosine_similarity(&a), 0.0);
        assert_eq!(a.cosine_similarity(&infinite), 0.0);
    }

    #[tokio::test]
    async fn test_embed_in_batches_preserves_order_and_bounds_concurrency() {
        let embedder = CountingEmbedder::new();
        let texts: Vec<String> = (1..=10).map(|n| "x".repeat(n)).collect();
        let options = BatchOptions {
            batch_size: 3,
            concurrency: 2,
            request_timeout: Duration::from_secs(5),
        };

        let embeddings = embed_in_batches(&embedder, &texts, options).await.unwrap();

        let lengths: Vec<f32> = embeddings.iter().map(|e| e.values[0]).collect();
        let expected: Vec<f32> = (1..=10).map(|n| n as f32).collect();
        assert_eq!(lengths, expected);
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 4);
        assert!(embedder.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_default_batch_calls_embed_in_order() {
        struct Single;

        #[async_trait]
        impl Embedder for Single {
            async fn embed(&self, text: &str) -> Result<Embedding> {
                Ok(Embedding::new(vec![text.len() as f32]))
            }

            fn dimensions(&self) -> usize {
                1
            }
        }

        let texts = vec!["a".to_string(), "bbb".to_string()];
        let embeddings = Single.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings[0].values, vec![1.0]);
        assert_eq!(embeddings[1].values, vec![3.0]);
    }

    #[tokio::test]
    async fn test_short_batch_response_is_an_error() {
        struct Lossy;

        #[async_trait]
        impl Embedder for Lossy {
            async fn embed(&self, _text: &str) -> Result<Embedding> {
                Ok(Embedding::new(vec![1.0]))
            }

            async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Embedding>> {
                Ok(vec![Embedding::new(vec![1.0])])
            }

            fn dimensions(&self) -> usize {
                1
            }
        }

        let texts = vec!["a".to_string(), "b".to_string()];
        let options = BatchOptions {
            batch_size: 8,
            concurrency: 1,
            request_timeout: Duration::from_secs(5),
        };
        let err = embed_in_batches(&Lossy, &texts, options).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingService(_)));
    }
}
