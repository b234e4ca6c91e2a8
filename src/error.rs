//! Error taxonomy shared by every stage of the pipeline.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Message shown to the user for faults they cannot correct themselves.
pub const GENERIC_FAILURE_MESSAGE: &str = "Uh oh! Something went wrong!";

/// Errors that can occur while ingesting a document or answering a question.
#[derive(Debug, Error)]
pub enum RagError {
    /// Text extraction failed or the document is empty.
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// The embedding provider failed.
    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    /// The language-model provider failed.
    #[error("Language model error: {0}")]
    LanguageModel(String),

    /// An external call did not complete within its deadline.
    #[error("{service} call timed out after {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },

    /// The caller passed an unusable argument.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A query was issued before any document was indexed.
    #[error("No document has been indexed yet")]
    EmptyIndex,

    /// Index construction failed; nothing from the attempt is kept.
    #[error("Failed to build index: {0}")]
    IndexBuild(#[source] Box<RagError>),

    /// An embedding did not have the dimensionality the index expects.
    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A second question arrived while one was still being answered.
    #[error("Another question is still being answered")]
    ConcurrentRequest,

    /// A step of turn processing failed; the question can be retried.
    #[error("Failed to answer {question:?}: {source}")]
    AnswerGeneration {
        question: String,
        #[source]
        source: Box<RagError>,
    },

    /// Configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Whether the caller may retry the same operation, possibly after backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::EmbeddingService(_)
            | RagError::LanguageModel(_)
            | RagError::Timeout { .. } => true,
            RagError::IndexBuild(source) | RagError::AnswerGeneration { source, .. } => {
                source.is_retryable()
            }
            _ => false,
        }
    }

    /// The innermost error, skipping build and turn wrappers.
    pub fn root(&self) -> &RagError {
        match self {
            RagError::IndexBuild(source) | RagError::AnswerGeneration { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// The question that failed, if this error came from turn processing.
    pub fn unanswered_question(&self) -> Option<&str> {
        match self {
            RagError::AnswerGeneration { question, .. } => Some(question),
            _ => None,
        }
    }

    /// One line suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self.root() {
            RagError::EmptyIndex => "Please provide a document before asking questions.".into(),
            RagError::InvalidInput(reason) => reason.clone(),
            RagError::ConcurrentRequest => "Please wait for the current answer to finish.".into(),
            RagError::Ingestion(_) => "Could not read any text from that document.".into(),
            _ => GENERIC_FAILURE_MESSAGE.into(),
        }
    }
}

/// Await an external call, failing with [`RagError::Timeout`] once `limit` elapses.
pub async fn with_timeout<T, F>(service: &'static str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RagError::Timeout {
            service,
            after: limit,
        }),
    }
}
