//! Static book summary dataset
//!
//! Loaded once at startup and shared read-only across requests. Titles
//! act as case-insensitive keys but keep their original casing in every
//! answer we return.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::oracles::{ChatMessage, ChatRole};

#[derive(Debug, Clone, Deserialize)]
pub struct BookRecord {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub themes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BookDataset {
    books: Vec<BookRecord>,
}

impl BookDataset {
    pub fn new(books: Vec<BookRecord>) -> Self {
        Self { books }
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading book summaries from {}", path.display()))?;
        let books: Vec<BookRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing book summaries from {}", path.display()))?;

        tracing::info!(books = books.len(), path = %path.display(), "Loaded book dataset");
        Ok(Self::new(books))
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Case-insensitive title lookup. Returns the stored summary text.
    pub fn summary_by_title(&self, title: &str) -> Option<&str> {
        let wanted = title.to_lowercase();
        self.books
            .iter()
            .find(|book| book.title.to_lowercase() == wanted)
            .map(|book| book.summary.as_str())
    }

    /// Most recently mentioned known title in prior assistant turns.
    ///
    /// Backward scan, stopping at the first assistant turn that contains
    /// any known title; if that turn mentions several, the last one in
    /// dataset order wins. Kept as an explicit ordered scan because the
    /// tie-break depends on it.
    pub fn last_mentioned_title(&self, history: &[ChatMessage]) -> Option<&str> {
        for turn in history.iter().rev() {
            if turn.role != ChatRole::Assistant {
                continue;
            }
            let mut mentioned = None;
            for book in &self.books {
                if turn.content.contains(&book.title) {
                    mentioned = Some(book.title.as_str());
                }
            }
            if mentioned.is_some() {
                return mentioned;
            }
        }
        None
    }
}
