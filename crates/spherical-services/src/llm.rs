//! OpenAI-compatible embeddings and chat-completions client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use spherical_core::{
  ServiceError,
  services::{ChatService, Embedder, ServiceFuture},
};

use crate::{
  Result,
  http::{build_client, check_status, endpoint, require_url, transport},
};

fn default_timeout_secs() -> u64 { 30 }

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
  /// e.g. `https://openrouter.ai/api/v1`.
  pub base_url:        String,
  #[serde(default)]
  pub api_key:         Option<String>,
  pub embedding_model: String,
  pub chat_model:      String,
  /// Model used for vision table extraction; the chat model when unset.
  #[serde(default)]
  pub vision_model:    Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs:    u64,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct LlmClient {
  client: Client,
  config: LlmConfig,
}

impl LlmClient {
  pub fn new(config: LlmConfig) -> Result<Self> {
    require_url("llm base_url", &config.base_url)?;
    let client = build_client(Duration::from_secs(config.timeout_secs))?;
    Ok(Self { client, config })
  }

  pub fn config(&self) -> &LlmConfig { &self.config }

  pub fn vision_model(&self) -> &str {
    self
      .config
      .vision_model
      .as_deref()
      .unwrap_or(&self.config.chat_model)
  }

  fn post(&self, path: &str) -> reqwest::RequestBuilder {
    let req = self.client.post(endpoint(&self.config.base_url, path));
    match &self.config.api_key {
      Some(key) if !key.is_empty() => req.bearer_auth(key),
      _ => req,
    }
  }

  /// `POST /embeddings`
  pub async fn embedding(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
    let body = EmbeddingRequest { model: &self.config.embedding_model, input: text };
    let resp = self
      .post("embeddings")
      .json(&body)
      .send()
      .await
      .map_err(transport)?;
    let resp: EmbeddingResponse = check_status(resp)
      .await?
      .json()
      .await
      .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
    first_embedding(resp)
  }

  /// `POST /chat/completions` with a single user message.
  pub async fn chat(&self, model: &str, content: MessageContent<'_>) -> Result<String, ServiceError> {
    let body = ChatRequest {
      model,
      messages: vec![ChatMessage { role: "user", content }],
      temperature: 0.0,
    };
    let resp = self
      .post("chat/completions")
      .json(&body)
      .send()
      .await
      .map_err(transport)?;
    let resp: ChatResponse = check_status(resp)
      .await?
      .json()
      .await
      .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
    first_content(resp)
  }
}

impl Embedder for LlmClient {
  fn embed<'a>(&'a self, text: &'a str) -> ServiceFuture<'a, Vec<f32>> {
    Box::pin(self.embedding(text))
  }
}

impl ChatService for LlmClient {
  fn complete<'a>(&'a self, prompt: &'a str) -> ServiceFuture<'a, String> {
    Box::pin(async move { self.chat(&self.config.chat_model, MessageContent::Text(prompt)).await })
  }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model:       &'a str,
  messages:    Vec<ChatMessage<'a>>,
  temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role:    &'static str,
  content: MessageContent<'a>,
}

/// A message body: plain text, or a list of typed parts.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MessageContent<'a> {
  Text(&'a str),
  Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart<'a> {
  Text { text: &'a str },
  File { file: FileData<'a> },
}

/// An inline file, `file_data` being a `data:` URL.
#[derive(Debug, Serialize)]
pub struct FileData<'a> {
  pub filename:  &'a str,
  pub file_data: String,
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
  message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
  #[serde(default)]
  content: Option<String>,
}

fn first_embedding(resp: EmbeddingResponse) -> Result<Vec<f32>, ServiceError> {
  match resp.data.into_iter().next() {
    Some(d) if !d.embedding.is_empty() => Ok(d.embedding),
    _ => Err(ServiceError::InvalidResponse("no embedding in response".into())),
  }
}

fn first_content(resp: ChatResponse) -> Result<String, ServiceError> {
  resp
    .choices
    .into_iter()
    .next()
    .and_then(|c| c.message.content)
    .filter(|c| !c.trim().is_empty())
    .ok_or_else(|| ServiceError::InvalidResponse("no completion in response".into()))
}
