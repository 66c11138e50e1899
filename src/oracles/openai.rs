//! OpenAI-compatible API client
//!
//! One reqwest client serves all four hosted-model surfaces: chat
//! completions, embeddings, image generation, and speech synthesis.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    ChatMessage, ChatOracle, EmbeddingOracle, GenerationError, ImageOracle, OracleCallError,
    SpeechOracle, SynthesisError,
};
use crate::config::OpenAiConfig;

/// Request timeout for model API calls (image generation is the slow one)
const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self { client, config }
    }

    async fn post(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, OracleCallError> {
        let res = self
            .client
            .post(format!("{}{}", self.config.api_url, path))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(OracleCallError::Api { status, body });
        }
        Ok(res)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<T, OracleCallError> {
        let res = self.post(path, payload).await?;
        res.json::<T>()
            .await
            .map_err(|e| OracleCallError::Malformed(format!("decode failed: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

#[async_trait]
impl ChatOracle for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, OracleCallError> {
        let payload = serde_json::json!({
            "model": self.config.chat_model,
            "messages": messages,
        });

        let body: ChatCompletionResponse = self.post_json("/chat/completions", &payload).await?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| OracleCallError::Malformed("no choices returned".to_string()))?;

        choice
            .message
            .content
            .ok_or_else(|| OracleCallError::Malformed("choice has no content".to_string()))
    }
}

#[async_trait]
impl EmbeddingOracle for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleCallError> {
        let payload = serde_json::json!({
            "model": self.config.embedding_model,
            "input": [text],
        });

        let body: EmbeddingResponse = self.post_json("/embeddings", &payload).await?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| OracleCallError::Malformed("no embedding returned".to_string()))
    }
}

#[async_trait]
impl ImageOracle for OpenAiClient {
    async fn generate_image(&self, prompt: &str, size: &str) -> Result<String, GenerationError> {
        let payload = serde_json::json!({
            "model": self.config.image_model,
            "prompt": prompt,
            "n": 1,
            "size": size,
        });

        let body: ImageResponse = self.post_json("/images/generations", &payload).await?;
        let url = body
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or_else(|| OracleCallError::Malformed("no image url returned".to_string()))?;

        Ok(url)
    }
}

#[async_trait]
impl SpeechOracle for OpenAiClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Bytes, SynthesisError> {
        let payload = serde_json::json!({
            "model": self.config.speech_model,
            "voice": voice,
            "input": text,
        });

        let res = self.post("/audio/speech", &payload).await?;
        let audio = res.bytes().await.map_err(OracleCallError::from)?;
        Ok(audio)
    }
}
