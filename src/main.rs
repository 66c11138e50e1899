mod books;
mod config;
mod errors;
mod metrics;
mod oracles;
mod routes;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::books::BookDataset;
use crate::oracles::{ChromaClient, OpenAiClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    dotenvy::dotenv().ok();
    let config = config::AppConfig::build().context("Failed to load configuration")?;

    // 2. Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.server.rust_log))
        .init();

    tracing::info!("Starting shelftalk...");

    // 3. Load the static book dataset
    let books = Arc::new(BookDataset::load(&config.data.book_summaries_path)?);

    // 4. Connect oracle clients. One OpenAI client covers chat,
    // embeddings, images and speech; Chroma holds the chunk collection.
    let openai = Arc::new(OpenAiClient::new(config.openai.clone()));
    let store = Arc::new(
        ChromaClient::connect(config.chroma.clone())
            .await
            .context("Connecting to Chroma vector store")?,
    );

    // 5. Initialize App State (Services)
    let state = services::AppState::new(
        openai.clone(),
        openai.clone(),
        store,
        openai.clone(),
        openai,
        books,
    );

    // 6. Setup Router
    let app = routes::create_router(state);

    // 7. Start Server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
