use crate::condense::QueryCondenser;
use crate::config::RagConfig;
use crate::conversation::ConversationTurn;
use crate::error::{with_timeout, RagError, Result};
use crate::index::{ScoredPassage, VectorIndex};
use crate::llm::{LanguageModel, Prompt};
use log::{error, info};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// First message of every conversation
pub const GREETING: &str = "Ask me a question about your text!";

/// Standing instruction for grounded answers
pub const SYSTEM_PROMPT: &str = "Your job is to answer questions about the supplied document. \
Answer using only the passages given in the context. Keep your answers technical, based on facts, \
and explain your reasoning. If the passages do not contain the answer, say so.";

/// Where the engine is in the question/answer cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No question answered yet
    Idle,
    /// The last question has no answer yet
    AwaitingAnswer,
    /// The last question was answered
    Ready,
}

/// Retrieval and generation knobs for a chat engine
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub top_k: usize,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl From<&RagConfig> for EngineSettings {
    fn from(config: &RagConfig) -> Self {
        EngineSettings {
            top_k: config.top_k,
            temperature: config.temperature,
            request_timeout: config.request_timeout(),
        }
    }
}

struct Conversation {
    turns: Vec<ConversationTurn>,
    state: EngineState,
    pending: Option<String>,
}

/// Answers questions about one indexed document and keeps the transcript.
///
/// Turns are processed one at a time. A question is recorded as soon as it is
/// accepted; if answering fails it stays in the transcript without a reply
/// until [`ChatEngine::retry`] answers it.
pub struct ChatEngine {
    index: Arc<VectorIndex>,
    condenser: QueryCondenser,
    llm: Arc<dyn LanguageModel>,
    settings: EngineSettings,
    turn: tokio::sync::Mutex<()>,
    conversation: Mutex<Conversation>,
}

impl ChatEngine {
    /// Create a new chat engine over `index`, seeded with the greeting
    pub fn new(
        index: Arc<VectorIndex>,
        llm: Arc<dyn LanguageModel>,
        settings: EngineSettings,
    ) -> Self {
        let condenser = QueryCondenser::new(llm.clone(), settings.request_timeout);

        ChatEngine {
            index,
            condenser,
            llm,
            settings,
            turn: tokio::sync::Mutex::new(()),
            conversation: Mutex::new(Conversation {
                turns: vec![ConversationTurn::assistant(GREETING)],
                state: EngineState::Idle,
                pending: None,
            }),
        }
    }

    /// Record a question in the transcript and answer it.
    ///
    /// While an earlier question is still unanswered, new questions are
    /// rejected until [`ChatEngine::retry`] succeeds.
    pub async fn answer(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("Please enter a question.".into()));
        }

        let _turn = self
            .turn
            .try_lock()
            .map_err(|_| RagError::ConcurrentRequest)?;

        if self.index.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        {
            let mut conversation = self.conversation();
            if let Some(pending) = &conversation.pending {
                return Err(RagError::InvalidInput(format!(
                    "\"{}\" has not been answered yet. Type /retry to ask it again.",
                    pending
                )));
            }
            conversation.turns.push(ConversationTurn::user(question));
            conversation.pending = Some(question.to_string());
        }

        self.respond(question).await
    }

    /// Answer the unanswered question at the end of the transcript
    pub async fn retry(&self) -> Result<String> {
        let _turn = self
            .turn
            .try_lock()
            .map_err(|_| RagError::ConcurrentRequest)?;

        let question = self.pending_question().ok_or_else(|| {
            RagError::InvalidInput("There is no unanswered question to retry.".into())
        })?;
        self.respond(&question).await
    }

    /// Run one turn for the trailing user turn, which must already be recorded
    async fn respond(&self, question: &str) -> Result<String> {
        let history = {
            let mut conversation = self.conversation();
            conversation.state = EngineState::AwaitingAnswer;
            // Skip the greeting and the question being answered
            let answered = conversation.turns.len().saturating_sub(2);
            let history: Vec<ConversationTurn> = conversation
                .turns
                .iter()
                .skip(1)
                .take(answered)
                .cloned()
                .collect();
            history
        };

        match self.generate(&history, question).await {
            Ok(answer) => {
                let mut conversation = self.conversation();
                conversation.turns.push(ConversationTurn::assistant(answer.clone()));
                conversation.pending = None;
                conversation.state = EngineState::Ready;
                info!("Answered question ({} turns)", conversation.turns.len());
                Ok(answer)
            }
            Err(source) => {
                error!("Failed to answer {:?}: {}", question, source);
                Err(RagError::AnswerGeneration {
                    question: question.to_string(),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Condense, retrieve, ground and generate
    async fn generate(&self, history: &[ConversationTurn], question: &str) -> Result<String> {
        let standalone = self.condenser.condense(history, question).await?;
        let passages = self.index.retrieve(&standalone, self.settings.top_k).await?;
        let prompt = grounding_prompt(&passages, &standalone);

        let answer = with_timeout(
            "language model",
            self.settings.request_timeout,
            self.llm.complete(&prompt, self.settings.temperature),
        )
        .await?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RagError::LanguageModel("model returned an empty answer".into()));
        }
        Ok(answer.to_string())
    }

    /// Transcript so far, oldest first
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.conversation().turns.clone()
    }

    pub fn state(&self) -> EngineState {
        self.conversation().state
    }

    /// The recorded question still waiting for an answer, if any
    pub fn pending_question(&self) -> Option<String> {
        self.conversation().pending.clone()
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    fn conversation(&self) -> MutexGuard<'_, Conversation> {
        // The guard is never held across an await, so a poisoned lock still
        // holds a consistent transcript
        self.conversation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Build the grounded prompt from retrieved passages and a standalone question
pub fn grounding_prompt(passages: &[ScoredPassage], question: &str) -> Prompt {
    let context = passages
        .iter()
        .enumerate()
        .map(|(i, scored)| format!("[{}] {}", i + 1, scored.passage.text.trim()))
        .collect::<Vec<String>>()
        .join("\n\n");

    Prompt::new(format!(
        "Context information from the document is below.\n\
---------------------\n\
{}\n\
---------------------\n\
Using only the context information above, answer the question.\n\
Question: {}\n\
Answer:",
        context, question
    ))
    .with_system(SYSTEM_PROMPT)
}
