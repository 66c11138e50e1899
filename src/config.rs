use config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub chroma: ChromaConfig,
    pub data: DataConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub api_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub image_model: String,
    pub speech_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChromaConfig {
    pub api_url: String,
    pub api_key: String,
    pub tenant: String,
    pub database: String,
    pub collection: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub book_summaries_path: String,
}

impl AppConfig {
    pub fn build() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.rust_log", "info,shelftalk=debug")?
            .set_default("openai.api_url", "https://api.openai.com/v1")?
            .set_default("openai.chat_model", "gpt-4o-mini")?
            .set_default("openai.embedding_model", "text-embedding-3-small")?
            .set_default("openai.image_model", "dall-e-3")?
            .set_default("openai.speech_model", "tts-1")?
            .set_default("chroma.api_url", "https://api.trychroma.com")?
            .set_default("chroma.collection", "book_chunks")?
            .set_default("data.book_summaries_path", "data/book_summaries.json")?
            // Environment variables win, e.g. `APP_SERVER__PORT=8080`
            .add_source(Environment::default().separator("__").prefix("APP"));

        builder.build()?.try_deserialize()
    }
}
