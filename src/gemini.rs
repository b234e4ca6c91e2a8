use crate::config::RagConfig;
use crate::embeddings::{Embedder, Embedding};
use crate::error::{RagError, Result};
use crate::llm::{LanguageModel, Prompt};
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for Gemini API
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
}

impl GeminiConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| RagError::Config("GEMINI_API_KEY not set".into()))?;
        let base_url = env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(GeminiConfig { api_key, base_url })
    }
}

/// Client for interacting with Gemini API
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
    embedding_model: String,
    chat_model: String,
    dimensions: usize,
    request_timeout: Duration,
}

impl GeminiClient {
    /// Create a new Gemini client using the models named in `rag`
    pub fn new(config: GeminiConfig, rag: &RagConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(rag.request_timeout())
            .build()
            .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(GeminiClient {
            config,
            client,
            embedding_model: model_path(&rag.embedding_model),
            chat_model: model_path(&rag.chat_model),
            dimensions: rag.embedding_dimensions,
            request_timeout: rag.request_timeout(),
        })
    }

    /// Get the client configuration
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            model,
            method
        )
    }

    async fn post_json<B, R>(
        &self,
        url: &str,
        body: &B,
        service: &'static str,
        fault: fn(String) -> RagError,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e, service, fault))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(fault(format!("API request failed: {} {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| self.transport_error(e, service, fault))
    }

    fn transport_error(
        &self,
        error: reqwest::Error,
        service: &'static str,
        fault: fn(String) -> RagError,
    ) -> RagError {
        if error.is_timeout() {
            RagError::Timeout {
                service,
                after: self.request_timeout,
            }
        } else {
            fault(error.without_url().to_string())
        }
    }

    fn embed_request<'a>(&'a self, text: &'a str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.embedding_model,
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
        }
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let url = self.url(&self.embedding_model, "embedContent");
        let response: EmbedContentResponse = self
            .post_json(
                &url,
                &self.embed_request(text),
                "embedding",
                RagError::EmbeddingService,
            )
            .await?;

        Ok(Embedding::new(response.embedding.values))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let request = BatchEmbedRequest {
            requests: texts.iter().map(|text| self.embed_request(text)).collect(),
        };

        let url = self.url(&self.embedding_model, "batchEmbedContents");
        let response: BatchEmbedResponse = self
            .post_json(&url, &request, "embedding", RagError::EmbeddingService)
            .await?;
        debug!("Embedded batch of {} texts", response.embeddings.len());

        Ok(response
            .embeddings
            .into_iter()
            .map(|data| Embedding::new(data.values))
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, prompt: &Prompt, temperature: f32) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: &prompt.user }],
            }],
            system_instruction: prompt.system.as_deref().map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                temperature,
                top_p: 0.8,
                top_k: 40,
                max_output_tokens: 1024,
            },
        };

        let url = self.url(&self.chat_model, "generateContent");
        let response: GenerateResponse = self
            .post_json(&url, &request, "language model", RagError::LanguageModel)
            .await?;

        response
            .text()
            .ok_or_else(|| RagError::LanguageModel("No response generated".into()))
    }
}

/// Gemini addresses models as `models/{id}`
fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

// Request/response structures for the Gemini API

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize, Debug)]
struct EmbedContentResponse {
    embedding: EmbeddingData,
}

#[derive(Deserialize, Debug)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Text of the first candidate, with all of its parts joined
    fn text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .map(|part| part.text)
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}
