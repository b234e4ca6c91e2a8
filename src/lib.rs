pub mod chunking;
pub mod condense;
pub mod config;
pub mod conversation;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod gemini;
pub mod index;
pub mod llm;
pub mod rag;
pub mod session;

pub use error::{RagError, Result};
