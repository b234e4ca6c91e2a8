use crate::conversation::ConversationTurn;
use crate::error::{with_timeout, Result};
use crate::llm::{LanguageModel, Prompt};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Rewrites are meant to be deterministic
const CONDENSE_TEMPERATURE: f32 = 0.0;

/// Rewrites follow-up questions into standalone ones using the chat history
pub struct QueryCondenser {
    llm: Arc<dyn LanguageModel>,
    request_timeout: Duration,
}

impl QueryCondenser {
    /// Create a new condenser
    pub fn new(llm: Arc<dyn LanguageModel>, request_timeout: Duration) -> Self {
        QueryCondenser {
            llm,
            request_timeout,
        }
    }

    /// Produce a question that can be understood without `history`.
    ///
    /// With no history there is nothing to resolve and the question is
    /// returned unchanged without calling the model.
    pub async fn condense(&self, history: &[ConversationTurn], question: &str) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let prompt = Prompt::new(condense_prompt(history, question));
        let rewritten = with_timeout(
            "language model",
            self.request_timeout,
            self.llm.complete(&prompt, CONDENSE_TEMPERATURE),
        )
        .await?;

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            warn!("Condensed question came back empty, using the original");
            return Ok(question.to_string());
        }

        debug!("Condensed {:?} into {:?}", question, rewritten);
        Ok(rewritten.to_string())
    }
}

/// Build the rewrite request for a follow-up question
pub fn condense_prompt(history: &[ConversationTurn], question: &str) -> String {
    let transcript = history
        .iter()
        .map(|turn| turn.to_string())
        .collect::<Vec<String>>()
        .join("\n");

    format!(
        "Given a conversation (between user and assistant) and a follow up message from the user, \
rewrite the message to be a standalone question that captures all relevant context from the conversation. \
Replace pronouns and elliptical references with what they refer to. \
Answer only with the standalone question and nothing else.\n\n\
<Chat History>\n{}\n</Chat History>\n\n\
<Follow Up Message>\n{}\n</Follow Up Message>\n\n\
<Standalone question>",
        transcript, question
    )
}
