pub mod resolver;

use std::sync::Arc;

use crate::books::BookDataset;
use crate::oracles::{ChatOracle, EmbeddingOracle, ImageOracle, SpeechOracle, VectorSearchOracle};
use crate::services::resolver::QueryResolver;

// A container for all services to be injected into routes
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<QueryResolver>,
    pub images: Arc<dyn ImageOracle>,
    pub speech: Arc<dyn SpeechOracle>,
}

impl AppState {
    pub fn new(
        chat: Arc<dyn ChatOracle>,
        embedder: Arc<dyn EmbeddingOracle>,
        store: Arc<dyn VectorSearchOracle>,
        images: Arc<dyn ImageOracle>,
        speech: Arc<dyn SpeechOracle>,
        books: Arc<BookDataset>,
    ) -> Self {
        Self {
            resolver: Arc::new(QueryResolver::new(
                chat,
                embedder,
                store,
                images.clone(),
                books,
            )),
            images,
            speech,
        }
    }
}
