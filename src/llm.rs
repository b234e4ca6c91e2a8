use crate::error::Result;
use async_trait::async_trait;

/// A prompt sent to a language model
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    /// Standing instruction for the model, if any
    pub system: Option<String>,
    /// The user-visible request
    pub user: String,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Prompt {
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A text-completion service
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt`; lower `temperature` favours consistent answers
    async fn complete(&self, prompt: &Prompt, temperature: f32) -> Result<String>;
}
