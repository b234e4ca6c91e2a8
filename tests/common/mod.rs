//! Scripted stand-ins for the embedding and language-model services.

#![allow(dead_code)]

use async_trait::async_trait;
use doc_chat::config::RagConfig;
use doc_chat::embeddings::{Embedder, Embedding};
use doc_chat::llm::{LanguageModel, Prompt};
use doc_chat::{RagError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Counts occurrences of a fixed vocabulary; unknown words are ignored
pub struct VocabEmbedder {
    vocab: Vec<&'static str>,
    failing: AtomicBool,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl VocabEmbedder {
    pub fn new(vocab: &[&'static str]) -> Self {
        VocabEmbedder {
            vocab: vocab.to_vec(),
            failing: AtomicBool::new(false),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(vocab: &[&'static str], delay: Duration) -> Self {
        VocabEmbedder {
            delay: Some(delay),
            ..VocabEmbedder::new(vocab)
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for VocabEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingService("503 Service Unavailable".into()));
        }

        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        Ok(Embedding::new(
            self.vocab
                .iter()
                .map(|v| words.iter().filter(|w| w.as_str() == *v).count() as f32)
                .collect(),
        ))
    }

    fn dimensions(&self) -> usize {
        self.vocab.len()
    }
}

/// Rewrites follow-ups by rule and answers by quoting the top passage
pub struct ScriptedModel {
    pub prompts: Mutex<Vec<Prompt>>,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        ScriptedModel {
            prompts: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        ScriptedModel {
            delay: Some(delay),
            ..ScriptedModel::new()
        }
    }

    /// Make the next `count` calls fail
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Prompts that asked for a standalone rewrite
    pub fn condense_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user.contains("<Follow Up Message>"))
            .map(|p| p.user.clone())
            .collect()
    }

    /// Questions that reached the grounded answer step
    pub fn answered_questions(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|p| between(&p.user, "Question: ", "\n").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &Prompt, _temperature: f32) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RagError::LanguageModel("500 Internal Server Error".into()));
        }

        if prompt.user.contains("<Follow Up Message>") {
            return Ok(rewrite_follow_up(&prompt.user));
        }

        let top_passage = between(&prompt.user, "[1] ", "\n").unwrap_or("nothing relevant");
        Ok(format!("According to the document: {}", top_passage))
    }
}

/// "And expenses?" after "What does the report say about revenue?" becomes
/// "What does the report say about expenses?"
fn rewrite_follow_up(prompt: &str) -> String {
    let follow_up = between(prompt, "<Follow Up Message>\n", "\n").unwrap_or_default();
    let last_question = prompt
        .lines()
        .filter_map(|line| line.strip_prefix("user: "))
        .last();

    let topic = follow_up
        .trim_start_matches("And ")
        .trim_start_matches("and ")
        .trim_end_matches('?')
        .trim();

    match last_question.and_then(|q| q.rfind(" about ").map(|pos| &q[..pos])) {
        Some(stem) if !topic.is_empty() => format!("{} about {}?", stem, topic),
        _ => follow_up.to_string(),
    }
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let rest = &text[from..];
    Some(rest.find(end).map_or(rest, |to| &rest[..to]))
}

/// Small passages so short test documents split per sentence
pub fn test_config() -> RagConfig {
    RagConfig {
        chunk_size: 20,
        chunk_overlap: 0,
        top_k: 2,
        embed_batch_size: 2,
        embed_concurrency: 2,
        request_timeout_secs: 5,
        ..RagConfig::default()
    }
}
