//! Chroma cloud vector store client
//!
//! The collection is populated out-of-band by the ingestion job; at
//! request time this client only queries. The collection id is resolved
//! once at startup (get-or-create by name).

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{ChunkMetadata, OracleCallError, RetrievedChunk, VectorSearchOracle};
use crate::config::ChromaConfig;

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct ChromaClient {
    client: reqwest::Client,
    config: ChromaConfig,
    collection_id: String,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    // Outer vec is one entry per query embedding; we always send one.
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<ChunkMetadata>>>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    metadatas: Vec<Option<ChunkMetadata>>,
}

impl ChromaClient {
    /// Connects and resolves the configured collection by name.
    pub async fn connect(config: ChromaConfig) -> Result<Self, OracleCallError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        let url = format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            config.api_url, config.tenant, config.database
        );
        let payload = serde_json::json!({
            "name": config.collection,
            "get_or_create": true,
        });

        let res = client
            .post(&url)
            .header("X-Chroma-Token", &config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(OracleCallError::Api { status, body });
        }

        let collection: CollectionResponse = res
            .json()
            .await
            .map_err(|e| OracleCallError::Malformed(format!("decode failed: {e}")))?;

        tracing::info!(
            collection = %config.collection,
            collection_id = %collection.id,
            "Connected to Chroma collection"
        );

        Ok(Self {
            client,
            config,
            collection_id: collection.id,
        })
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        action: &str,
        payload: &serde_json::Value,
    ) -> Result<T, OracleCallError> {
        let url = format!(
            "{}/api/v2/tenants/{}/databases/{}/collections/{}/{}",
            self.config.api_url,
            self.config.tenant,
            self.config.database,
            self.collection_id,
            action
        );

        let res = self
            .client
            .post(&url)
            .header("X-Chroma-Token", &self.config.api_key)
            .json(payload)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(OracleCallError::Api { status, body });
        }

        res.json::<T>()
            .await
            .map_err(|e| OracleCallError::Malformed(format!("decode failed: {e}")))
    }
}

#[async_trait]
impl VectorSearchOracle for ChromaClient {
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, OracleCallError> {
        let payload = serde_json::json!({
            "query_embeddings": [vector],
            "n_results": top_k,
            "include": ["documents", "metadatas"],
        });

        let body: QueryResponse = self.post_json("query", &payload).await?;

        let documents = body.documents.into_iter().next().unwrap_or_default();
        let mut metadatas = body
            .metadatas
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter();

        let chunks = documents
            .into_iter()
            .map(|doc| RetrievedChunk {
                document: doc.unwrap_or_default(),
                metadata: metadatas.next().flatten().unwrap_or_default(),
            })
            .collect();

        Ok(chunks)
    }

    async fn list_all_metadata(&self) -> Result<Vec<ChunkMetadata>, OracleCallError> {
        let payload = serde_json::json!({
            "include": ["metadatas"],
        });

        let body: GetResponse = self.post_json("get", &payload).await?;
        Ok(body.metadatas.into_iter().flatten().collect())
    }
}
