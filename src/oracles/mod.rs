//! Oracle client abstractions
//!
//! Every external model call goes through one of these traits so the
//! resolver pipeline can be exercised against deterministic fakes. Live
//! implementations live in `openai` (chat, embeddings, images, speech)
//! and `chroma` (vector search).

pub mod chroma;
pub mod openai;

pub use chroma::ChromaClient;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chunk metadata is an open map; the ingestion job controls its shape.
pub type ChunkMetadata = serde_json::Map<String, serde_json::Value>;

/// Failure of a single oracle round trip.
#[derive(Debug, Error)]
pub enum OracleCallError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unexpected response shape: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
#[error("image generation failed: {0}")]
pub struct GenerationError(#[from] pub OracleCallError);

#[derive(Debug, Error)]
#[error("speech synthesis failed: {0}")]
pub struct SynthesisError(#[from] pub OracleCallError);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// One turn of a conversation, both on the inbound wire (`history` in the
/// ask request) and toward the chat oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One ranked hit from the vector store.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// Chat/completion oracle: ordered messages in, assistant text out.
#[async_trait]
pub trait ChatOracle: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, OracleCallError>;
}

#[async_trait]
pub trait EmbeddingOracle: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleCallError>;
}

/// Vector search oracle over the pre-populated chunk collection.
#[async_trait]
pub trait VectorSearchOracle: Send + Sync {
    /// Top-k nearest chunks by embedding similarity, best first.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, OracleCallError>;

    /// Metadata of every stored chunk (used for the themes fallback).
    async fn list_all_metadata(&self) -> Result<Vec<ChunkMetadata>, OracleCallError>;
}

#[async_trait]
pub trait ImageOracle: Send + Sync {
    /// Returns a URL to the generated image.
    async fn generate_image(&self, prompt: &str, size: &str) -> Result<String, GenerationError>;
}

#[async_trait]
pub trait SpeechOracle: Send + Sync {
    /// Returns encoded audio (MP3).
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Bytes, SynthesisError>;
}
