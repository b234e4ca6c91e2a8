use crate::chunking::split_into_passages;
use crate::config::RagConfig;
use crate::conversation::ConversationTurn;
use crate::document::Document;
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::llm::LanguageModel;
use crate::rag::{ChatEngine, EngineSettings};
use log::{info, warn};
use std::sync::Arc;

/// One user's conversation about one document.
///
/// Owns the vector index and the chat engine built over it. Ingesting a new
/// document replaces both, so no history or passages leak between documents.
pub struct Session {
    config: RagConfig,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    engine: ChatEngine,
    document_id: Option<String>,
}

impl Session {
    /// Create a session with no document indexed yet
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        config.validate()?;

        let index = VectorIndex::empty(embedder.clone(), config.request_timeout());
        let engine = ChatEngine::new(Arc::new(index), llm.clone(), EngineSettings::from(&config));

        Ok(Session {
            config,
            embedder,
            llm,
            engine,
            document_id: None,
        })
    }

    /// Chunk and index a document, starting a fresh conversation about it.
    ///
    /// Returns the number of indexed passages. On failure the session is left
    /// with an empty index, never with the previous document's passages.
    pub async fn ingest(&mut self, document: &Document) -> Result<usize> {
        info!("Loading and indexing {}", document.document_id);

        match self.build_index(document).await {
            Ok(index) => {
                let passage_count = index.len();
                self.install(index);
                self.document_id = Some(document.document_id.clone());
                info!(
                    "Indexed {} into {} passages",
                    document.document_id, passage_count
                );
                Ok(passage_count)
            }
            Err(e) => {
                warn!("Indexing {} failed: {}", document.document_id, e);
                let empty = VectorIndex::empty(self.embedder.clone(), self.config.request_timeout());
                self.install(empty);
                self.document_id = None;
                Err(e)
            }
        }
    }

    async fn build_index(&self, document: &Document) -> Result<VectorIndex> {
        let passages = split_into_passages(
            &document.content,
            &document.document_id,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )?;
        info!("Split into {} passages", passages.len());

        VectorIndex::build(passages, self.embedder.clone(), self.config.batch_options()).await
    }

    fn install(&mut self, index: VectorIndex) {
        self.engine = ChatEngine::new(
            Arc::new(index),
            self.llm.clone(),
            EngineSettings::from(&self.config),
        );
    }

    /// Ask a question about the current document
    pub async fn ask(&self, question: &str) -> Result<String> {
        self.engine.answer(question).await
    }

    /// Ask the last failed question again
    pub async fn retry(&self) -> Result<String> {
        self.engine.retry().await
    }

    /// Transcript so far, oldest first
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.engine.history()
    }

    pub fn engine(&self) -> &ChatEngine {
        &self.engine
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The document currently indexed, if any
    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }
}
