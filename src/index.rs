use crate::chunking::Passage;
use crate::embeddings::{embed_in_batches, BatchOptions, Embedder, Embedding};
use crate::error::{with_timeout, RagError, Result};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

/// A passage returned by retrieval together with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

struct IndexEntry {
    passage: Passage,
    embedding: Embedding,
}

/// In-memory nearest-neighbour index over the passages of one document.
///
/// The index is read-only once built. A new document gets a new index.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    embedder: Arc<dyn Embedder>,
    request_timeout: Duration,
}

impl VectorIndex {
    /// An index with no passages; every retrieval fails with [`RagError::EmptyIndex`]
    pub fn empty(embedder: Arc<dyn Embedder>, request_timeout: Duration) -> Self {
        VectorIndex {
            entries: Vec::new(),
            embedder,
            request_timeout,
        }
    }

    /// Embed every passage and store the pairs in passage order.
    ///
    /// Any failure is reported as [`RagError::IndexBuild`] and nothing from
    /// the attempt survives.
    pub async fn build(
        passages: Vec<Passage>,
        embedder: Arc<dyn Embedder>,
        options: BatchOptions,
    ) -> Result<Self> {
        if passages.is_empty() {
            return Err(RagError::IndexBuild(Box::new(RagError::InvalidInput(
                "no passages to index".into(),
            ))));
        }

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let embeddings = embed_in_batches(embedder.as_ref(), &texts, options)
            .await
            .map_err(|e| RagError::IndexBuild(Box::new(e)))?;

        let expected = embedder.dimensions();
        if let Some(bad) = embeddings.iter().find(|e| e.dimensions() != expected) {
            return Err(RagError::IndexBuild(Box::new(RagError::DimensionMismatch {
                expected,
                actual: bad.dimensions(),
            })));
        }

        let entries: Vec<IndexEntry> = passages
            .into_iter()
            .zip(embeddings)
            .map(|(passage, embedding)| IndexEntry { passage, embedding })
            .collect();

        info!(
            "Indexed {} passages ({} dimensions)",
            entries.len(),
            expected
        );

        Ok(VectorIndex {
            entries,
            embedder,
            request_timeout: options.request_timeout,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimensionality every stored and query embedding must have
    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    /// Stored passages in document order
    pub fn passages(&self) -> impl Iterator<Item = &Passage> {
        self.entries.iter().map(|entry| &entry.passage)
    }

    /// Find the `k` passages most similar to `query`, best first
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        if self.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        let query_embedding =
            with_timeout("embedding", self.request_timeout, self.embedder.embed(query)).await?;

        let expected = self.dimensions();
        if query_embedding.dimensions() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: query_embedding.dimensions(),
            });
        }

        let results = self.rank(&query_embedding, k);
        debug!(
            "Retrieved {} of {} passages for query",
            results.len(),
            self.len()
        );
        Ok(results)
    }

    /// Score every passage against an embedded query and keep the best `k`.
    /// Equal scores keep document order.
    pub fn rank(&self, query: &Embedding, k: usize) -> Vec<ScoredPassage> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, entry.embedding.cosine_similarity(query)))
            .collect();

        // Stable sort, so ties stay in passage order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k.min(self.entries.len()));

        scored
            .into_iter()
            .map(|(idx, score)| ScoredPassage {
                passage: self.entries[idx].passage.clone(),
                score,
            })
            .collect()
    }
}
