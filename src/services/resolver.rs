//! Conversational query resolution
//!
//! The one place in the service with real decision logic. A question
//! either takes the `/summary` command path (dataset lookup, optional
//! translation) or the general RAG path (language detect, optional
//! history reformulation, embed, search, grounded generation) with a
//! themes-listing fallback when the store returns nothing.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::books::BookDataset;
use crate::errors::AppError;
use crate::oracles::{
    ChatMessage, ChatOracle, ChunkMetadata, EmbeddingOracle, ImageOracle, VectorSearchOracle,
};

/// Command marker for the summary path
const SUMMARY_COMMAND: &str = "/summary";

/// Recognized language-request phrases, matched case-insensitively
const LANGUAGE_PHRASES: [&str; 6] = [
    "in limba romana",
    "în română",
    "in romanian",
    "in english",
    "en français",
    "auf deutsch",
];

/// Keywords that trigger the optional image attachment
const IMAGE_KEYWORDS: [&str; 5] = [
    "image",
    "picture",
    "draw",
    "generate an image",
    "show me a picture",
];

/// Chunks retrieved per query
const SEARCH_TOP_K: usize = 3;

/// Image size for inline chat attachments
const ATTACHMENT_IMAGE_SIZE: &str = "512x512";

/// Answer when the summary command cannot resolve a title at all
pub const NO_TITLE_MESSAGE: &str = "No book title found in previous answers.";

/// Final answer payload for one resolved question.
///
/// `themes` only appears on the no-match fallback and never together
/// with a non-empty `context`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub themes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl QueryResult {
    fn text_only(answer: String, context: String) -> Self {
        Self {
            answer,
            context,
            themes: None,
            image_url: None,
        }
    }
}

pub struct QueryResolver {
    chat: Arc<dyn ChatOracle>,
    embedder: Arc<dyn EmbeddingOracle>,
    store: Arc<dyn VectorSearchOracle>,
    images: Arc<dyn ImageOracle>,
    books: Arc<BookDataset>,
}

impl QueryResolver {
    pub fn new(
        chat: Arc<dyn ChatOracle>,
        embedder: Arc<dyn EmbeddingOracle>,
        store: Arc<dyn VectorSearchOracle>,
        images: Arc<dyn ImageOracle>,
        books: Arc<BookDataset>,
    ) -> Self {
        Self {
            chat,
            embedder,
            store,
            images,
            books,
        }
    }

    pub async fn resolve(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<QueryResult, AppError> {
        let start = Instant::now();
        metrics::counter!("shelftalk_ask_requests_total").increment(1);

        let result = if question.trim().starts_with(SUMMARY_COMMAND) {
            metrics::counter!("shelftalk_summary_requests_total").increment(1);
            self.resolve_summary_command(question, history).await
        } else {
            self.resolve_rag_query(question, history).await
        };

        metrics::histogram!("shelftalk_resolve_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        result
    }

    /// Branch A: `/summary [title] [language phrase]`
    async fn resolve_summary_command(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<QueryResult, AppError> {
        let desired_language = self
            .chat
            .complete(&[ChatMessage::user(format!(
                "What language does the user want the answer in? \
                 Respond only with the language name.\n\nUser request: {question}"
            ))])
            .await
            .map_err(AppError::oracle("language_detect"))?
            .trim()
            .to_string();

        let trimmed = question.trim();
        let mut title = strip_language_phrases(&trimmed[SUMMARY_COMMAND.len()..]);

        // An empty title, or an explicit language request, means the user
        // is referring back to a book we already mentioned.
        let question_lower = question.to_lowercase();
        if title.is_empty() || LANGUAGE_PHRASES.iter().any(|p| question_lower.contains(p)) {
            title = self
                .books
                .last_mentioned_title(history)
                .unwrap_or_default()
                .to_string();
        }

        let mut summary = if title.is_empty() {
            NO_TITLE_MESSAGE.to_string()
        } else {
            match self.books.summary_by_title(&title) {
                Some(summary) => summary.to_string(),
                None => format!("No summary found for title: {title}"),
            }
        };

        let wants_english = desired_language.eq_ignore_ascii_case("english")
            || desired_language.eq_ignore_ascii_case("en");
        if !wants_english && !summary.is_empty() && !summary.starts_with(NO_TITLE_MESSAGE) {
            summary = self
                .chat
                .complete(&[ChatMessage::user(format!(
                    "Translate the following book summary to {desired_language}:\n\n{summary}"
                ))])
                .await
                .map_err(AppError::oracle("translate"))?
                .trim()
                .to_string();
        }

        Ok(QueryResult::text_only(summary, String::new()))
    }

    /// Branch B: general retrieval-augmented query
    async fn resolve_rag_query(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<QueryResult, AppError> {
        let user_language = self
            .chat
            .complete(&[ChatMessage::user(format!(
                "What language is used in the following text? \
                 Answer only with the language name.\n\nText: {question}"
            ))])
            .await
            .map_err(AppError::oracle("language_detect"))?
            .trim()
            .to_string();

        let standalone_question = if history.is_empty() {
            question.to_string()
        } else {
            let mut messages = history.to_vec();
            messages.push(ChatMessage::user(format!(
                "Reformulate the following question as a standalone question, \
                 using the context of the conversation: {question}"
            )));
            self.chat
                .complete(&messages)
                .await
                .map_err(AppError::oracle("reformulate"))?
                .trim()
                .to_string()
        };

        let embedding = self
            .embedder
            .embed(&standalone_question)
            .await
            .map_err(AppError::oracle("embed"))?;

        let chunks = self
            .store
            .search(&embedding, SEARCH_TOP_K)
            .await
            .map_err(AppError::oracle("search"))?;

        if chunks.is_empty() {
            return self.resolve_no_match(question, &user_language).await;
        }

        let context = chunks
            .iter()
            .map(|chunk| chunk.document.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        // All-empty chunks: answer nothing rather than let the model
        // free-associate without grounding.
        if context.trim().is_empty() {
            return Ok(QueryResult::text_only(String::new(), String::new()));
        }

        let prompt = format!(
            "Use only the information from the context below to answer the question. \
             Do not invent titles or information that does not appear in the context. \
             Answer in {user_language}.\n\nContext:\n{context}\n\n\
             Question: {standalone_question}\nAnswer:"
        );
        let answer = self
            .chat
            .complete(&[ChatMessage::user(prompt)])
            .await
            .map_err(AppError::oracle("generate"))?
            .trim()
            .to_string();

        let image_url = self.maybe_attach_image(question).await;

        Ok(QueryResult {
            answer,
            context,
            themes: None,
            image_url,
        })
    }

    /// Nothing retrieved: refuse politely and enumerate the themes the
    /// store does cover, without naming any title.
    async fn resolve_no_match(
        &self,
        question: &str,
        user_language: &str,
    ) -> Result<QueryResult, AppError> {
        metrics::counter!("shelftalk_no_match_total").increment(1);

        let metadatas = self
            .store
            .list_all_metadata()
            .await
            .map_err(AppError::oracle("list_metadata"))?;
        let theme_list = collect_themes(&metadatas);

        let prompt = format!(
            "Respond politely in {user_language} as a chatbot that did not find any \
             suitable book for the requested topic. Explicitly state that you only have \
             access to books in your database. Do not mention book titles! List only the \
             available themes.\n\nQuestion: {question}\nAvailable themes: {}",
            theme_list.join(", ")
        );
        let answer = self
            .chat
            .complete(&[ChatMessage::user(prompt)])
            .await
            .map_err(AppError::oracle("generate"))?
            .trim()
            .to_string();

        Ok(QueryResult {
            answer,
            context: String::new(),
            themes: Some(theme_list),
            image_url: None,
        })
    }

    /// Best-effort image attachment; failures never reach the caller.
    async fn maybe_attach_image(&self, question: &str) -> Option<String> {
        let question_lower = question.to_lowercase();
        if !IMAGE_KEYWORDS.iter().any(|kw| question_lower.contains(kw)) {
            return None;
        }

        match self
            .images
            .generate_image(question, ATTACHMENT_IMAGE_SIZE)
            .await
        {
            Ok(url) => {
                metrics::counter!("shelftalk_image_attachments_total").increment(1);
                Some(url)
            }
            Err(error) => {
                tracing::warn!(%error, "Image attachment failed, answering without it");
                None
            }
        }
    }
}

/// Removes any recognized language-request phrase from the raw title
/// remainder. When a phrase is removed the rest is kept lowercased; the
/// case-insensitive title lookup absorbs that.
fn strip_language_phrases(raw: &str) -> String {
    let mut title = raw.trim().to_string();
    for phrase in LANGUAGE_PHRASES {
        let lower = title.to_lowercase();
        if lower.contains(phrase) {
            title = lower.replace(phrase, "").trim().to_string();
        }
    }
    title
}

/// Union of the `themes` metadata values, sorted. Each value is a
/// comma-separated string as written by the ingestion job.
fn collect_themes(metadatas: &[ChunkMetadata]) -> Vec<String> {
    let mut themes = BTreeSet::new();
    for meta in metadatas {
        if let Some(value) = meta.get("themes").and_then(|v| v.as_str()) {
            for theme in value.split(',') {
                let theme = theme.trim();
                if !theme.is_empty() {
                    themes.insert(theme.to_string());
                }
            }
        }
    }
    themes.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::books::BookRecord;
    use crate::oracles::{GenerationError, OracleCallError, RetrievedChunk};

    /// Scripted chat oracle: replies by prompt prefix and records every
    /// prompt so tests can assert which stages ran.
    struct FakeChat {
        language: String,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeChat {
        fn new(language: &str) -> Arc<Self> {
            Arc::new(Self {
                language: language.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts_starting_with(&self, prefix: &str) -> usize {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.starts_with(prefix))
                .count()
        }
    }

    #[async_trait]
    impl ChatOracle for FakeChat {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, OracleCallError> {
            let prompt = messages.last().unwrap().content.clone();
            self.prompts.lock().unwrap().push(prompt.clone());

            let reply = if prompt.starts_with("What language") {
                self.language.clone()
            } else if prompt.starts_with("Reformulate") {
                "standalone question".to_string()
            } else if prompt.starts_with("Translate") {
                "rezumat tradus".to_string()
            } else if prompt.starts_with("Respond politely") {
                "polite refusal".to_string()
            } else {
                "grounded answer".to_string()
            };
            Ok(reply)
        }
    }

    struct FakeEmbedder {
        inputs: Mutex<Vec<String>>,
    }

    impl FakeEmbedder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inputs: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EmbeddingOracle for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleCallError> {
            self.inputs.lock().unwrap().push(text.to_string());
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct FakeStore {
        chunks: Vec<RetrievedChunk>,
        metadatas: Vec<ChunkMetadata>,
        search_calls: AtomicUsize,
    }

    impl FakeStore {
        fn with_chunks(chunks: Vec<RetrievedChunk>) -> Arc<Self> {
            Arc::new(Self {
                chunks,
                metadatas: Vec::new(),
                search_calls: AtomicUsize::new(0),
            })
        }

        fn empty_with_metadata(metadatas: Vec<ChunkMetadata>) -> Arc<Self> {
            Arc::new(Self {
                chunks: Vec::new(),
                metadatas,
                search_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VectorSearchOracle for FakeStore {
        async fn search(
            &self,
            _vector: &[f32],
            _top_k: usize,
        ) -> Result<Vec<RetrievedChunk>, OracleCallError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.chunks.clone())
        }

        async fn list_all_metadata(&self) -> Result<Vec<ChunkMetadata>, OracleCallError> {
            Ok(self.metadatas.clone())
        }
    }

    struct FakeImages {
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeImages {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageOracle for FakeImages {
        async fn generate_image(
            &self,
            _prompt: &str,
            _size: &str,
        ) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(GenerationError(OracleCallError::Malformed(
                    "nope".to_string(),
                )))
            } else {
                Ok("https://img.example/generated.png".to_string())
            }
        }
    }

    fn books() -> Arc<BookDataset> {
        Arc::new(BookDataset::new(vec![
            BookRecord {
                title: "Dune".to_string(),
                summary: "A desert planet holds the key to interstellar power.".to_string(),
                themes: vec!["politics".to_string(), "ecology".to_string()],
            },
            BookRecord {
                title: "The Hobbit".to_string(),
                summary: "A reluctant burglar walks to a mountain and back.".to_string(),
                themes: vec!["adventure".to_string()],
            },
        ]))
    }

    fn chunk(document: &str) -> RetrievedChunk {
        RetrievedChunk {
            document: document.to_string(),
            metadata: ChunkMetadata::new(),
        }
    }

    fn meta(themes: &str) -> ChunkMetadata {
        let mut map = ChunkMetadata::new();
        map.insert("themes".to_string(), serde_json::Value::from(themes));
        map
    }

    fn resolver(
        chat: Arc<FakeChat>,
        store: Arc<FakeStore>,
        images: Arc<FakeImages>,
    ) -> QueryResolver {
        QueryResolver::new(chat, FakeEmbedder::new(), store, images, books())
    }

    #[tokio::test]
    async fn summary_command_takes_branch_a_exclusively() {
        let chat = FakeChat::new("English");
        let store = FakeStore::with_chunks(vec![chunk("unused")]);
        let r = resolver(chat, store.clone(), FakeImages::ok());

        let result = r.resolve("  /summary Dune  ", &[]).await.unwrap();

        assert_eq!(
            result.answer,
            "A desert planet holds the key to interstellar power."
        );
        assert_eq!(result.context, "");
        // Branch A never touches the vector store.
        assert_eq!(store.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn summary_recovers_title_from_history() {
        let chat = FakeChat::new("English");
        let r = resolver(
            chat.clone(),
            FakeStore::with_chunks(vec![]),
            FakeImages::ok(),
        );
        let history = vec![
            ChatMessage::user("recommend something"),
            ChatMessage::assistant("You should read Dune, it is great."),
        ];

        let result = r.resolve("/summary in english", &history).await.unwrap();

        assert_eq!(
            result.answer,
            "A desert planet holds the key to interstellar power."
        );
        // English request: no translation round trip.
        assert_eq!(chat.prompts_starting_with("Translate"), 0);
    }

    #[tokio::test]
    async fn summary_unknown_title_returns_exact_not_found_message() {
        let chat = FakeChat::new("English");
        let r = resolver(chat, FakeStore::with_chunks(vec![]), FakeImages::ok());

        let result = r.resolve("/summary Nonexistent Book", &[]).await.unwrap();

        assert_eq!(
            result.answer,
            "No summary found for title: Nonexistent Book"
        );
    }

    #[tokio::test]
    async fn summary_without_title_or_history_degenerates() {
        let chat = FakeChat::new("French");
        let r = resolver(
            chat.clone(),
            FakeStore::with_chunks(vec![]),
            FakeImages::ok(),
        );

        let result = r.resolve("/summary", &[]).await.unwrap();

        assert_eq!(result.answer, NO_TITLE_MESSAGE);
        // The fixed message is never translated, even for non-English.
        assert_eq!(chat.prompts_starting_with("Translate"), 0);
    }

    #[tokio::test]
    async fn summary_translates_for_non_english_language() {
        let chat = FakeChat::new("Romanian");
        let r = resolver(
            chat.clone(),
            FakeStore::with_chunks(vec![]),
            FakeImages::ok(),
        );

        let result = r.resolve("/summary Dune", &[]).await.unwrap();

        assert_eq!(result.answer, "rezumat tradus");
        assert_eq!(chat.prompts_starting_with("Translate"), 1);
    }

    #[tokio::test]
    async fn english_detection_is_case_insensitive() {
        for language in ["ENGLISH", "en", "En"] {
            let chat = FakeChat::new(language);
            let r = resolver(
                chat.clone(),
                FakeStore::with_chunks(vec![]),
                FakeImages::ok(),
            );

            let result = r.resolve("/summary Dune", &[]).await.unwrap();

            assert_eq!(
                result.answer,
                "A desert planet holds the key to interstellar power.",
                "language {language} should suppress translation"
            );
            assert_eq!(chat.prompts_starting_with("Translate"), 0);
        }
    }

    #[tokio::test]
    async fn rag_answers_from_retrieved_context() {
        let chat = FakeChat::new("English");
        let store = FakeStore::with_chunks(vec![chunk("chunk one"), chunk("chunk two")]);
        let r = resolver(chat.clone(), store, FakeImages::ok());

        let result = r.resolve("recommend a war novel", &[]).await.unwrap();

        assert_eq!(result.answer, "grounded answer");
        assert_eq!(result.context, "chunk one\nchunk two");
        assert!(result.themes.is_none());
        assert!(result.image_url.is_none());
        // No history, so no reformulation round trip.
        assert_eq!(chat.prompts_starting_with("Reformulate"), 0);
    }

    #[tokio::test]
    async fn rag_reformulates_follow_up_questions() {
        let chat = FakeChat::new("English");
        let embedder = FakeEmbedder::new();
        let r = QueryResolver::new(
            chat.clone(),
            embedder.clone(),
            FakeStore::with_chunks(vec![chunk("doc")]),
            FakeImages::ok(),
            books(),
        );
        let history = vec![
            ChatMessage::user("any dystopias?"),
            ChatMessage::assistant("Plenty."),
        ];

        r.resolve("what about that one?", &history).await.unwrap();

        assert_eq!(chat.prompts_starting_with("Reformulate"), 1);
        // The reformulated question is what gets embedded.
        assert_eq!(
            embedder.inputs.lock().unwrap().as_slice(),
            ["standalone question"]
        );
    }

    #[tokio::test]
    async fn no_match_falls_back_to_sorted_theme_list() {
        let chat = FakeChat::new("Romanian");
        let store = FakeStore::empty_with_metadata(vec![
            meta("war, friendship"),
            meta("adventure"),
            meta("friendship"),
        ]);
        let r = resolver(chat, store, FakeImages::ok());

        let result = r.resolve("books about cooking?", &[]).await.unwrap();

        assert_eq!(result.answer, "polite refusal");
        assert_eq!(result.context, "");
        assert_eq!(
            result.themes,
            Some(vec![
                "adventure".to_string(),
                "friendship".to_string(),
                "war".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn all_empty_chunks_short_circuit_without_generation() {
        let chat = FakeChat::new("English");
        let store = FakeStore::with_chunks(vec![chunk(""), chunk("  "), chunk("")]);
        let r = resolver(chat.clone(), store, FakeImages::ok());

        let result = r.resolve("anything?", &[]).await.unwrap();

        assert_eq!(result.answer, "");
        assert_eq!(result.context, "");
        assert!(result.themes.is_none());
        assert_eq!(chat.prompts_starting_with("Use only the information"), 0);
    }

    #[tokio::test]
    async fn picture_keyword_attaches_image_url() {
        let chat = FakeChat::new("English");
        let images = FakeImages::ok();
        let r = resolver(
            chat,
            FakeStore::with_chunks(vec![chunk("doc")]),
            images.clone(),
        );

        let result = r
            .resolve("Show me a PICTURE of a sandworm", &[])
            .await
            .unwrap();

        assert_eq!(
            result.image_url.as_deref(),
            Some("https://img.example/generated.png")
        );
        assert_eq!(images.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn image_failure_is_swallowed() {
        let chat = FakeChat::new("English");
        let images = FakeImages::failing();
        let r = resolver(
            chat,
            FakeStore::with_chunks(vec![chunk("doc")]),
            images.clone(),
        );

        let result = r.resolve("draw a sandworm for me", &[]).await.unwrap();

        assert_eq!(result.answer, "grounded answer");
        assert_eq!(result.context, "doc");
        assert!(result.image_url.is_none());
        assert_eq!(images.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_summary_question_takes_branch_b() {
        let chat = FakeChat::new("English");
        let store = FakeStore::with_chunks(vec![chunk("doc")]);
        let r = resolver(chat, store.clone(), FakeImages::ok());

        // "/summary" not at the start does not trigger the command.
        r.resolve("what does /summary do?", &[]).await.unwrap();

        assert_eq!(store.search_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn strips_language_phrases_case_insensitively() {
        assert_eq!(strip_language_phrases(" Dune IN ENGLISH"), "dune");
        assert_eq!(strip_language_phrases(" in english "), "");
        assert_eq!(strip_language_phrases(" Dune "), "Dune");
    }

    #[test]
    fn collects_themes_from_comma_separated_metadata() {
        let metadatas = vec![meta("war, friendship"), meta(""), ChunkMetadata::new()];
        assert_eq!(collect_themes(&metadatas), vec!["friendship", "war"]);
    }

    #[test]
    fn query_result_omits_absent_optional_fields() {
        let result = QueryResult::text_only("a".to_string(), "c".to_string());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({"answer": "a", "context": "c"}));
    }
}
