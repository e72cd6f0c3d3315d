//! Milvus vector store provider
//!
//! Talks to the Milvus v2 REST API. Records are inserted with a
//! store-assigned primary key; the identity field is a dynamic field
//! queried with an `in [...]` filter.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::VectorDbConfig;
use crate::error::{Error, Result};
use crate::types::IndexedRecord;

use super::vector_store::VectorStoreProvider;

/// Milvus REST vector store
pub struct MilvusVectorStore {
    client: Client,
    base_url: String,
    token: Option<String>,
    collection: String,
    identity_field: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionRequest<'a> {
    collection_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionRequest<'a> {
    collection_name: &'a str,
    dimension: usize,
    metric_type: &'a str,
    id_type: &'a str,
    #[serde(rename = "autoID")]
    auto_id: bool,
    primary_field_name: &'a str,
    vector_field_name: &'a str,
    params: CreateParams,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    enable_dynamic_field: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    collection_name: &'a str,
    filter: String,
    output_fields: Vec<&'a str>,
    limit: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRequest<'a> {
    collection_name: &'a str,
    data: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct MilvusResponse<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct HasCollection {
    has: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertResult {
    insert_count: usize,
}

#[derive(Deserialize)]
struct CollectionStats {
    #[serde(rename = "rowCount")]
    row_count: usize,
}

impl MilvusVectorStore {
    /// Create a new Milvus store from config
    pub fn new(config: &VectorDbConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.uri.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            collection: config.collection.clone(),
            identity_field: config.identity_field.clone(),
        })
    }

    /// POST to a v2 endpoint and unwrap the `{code, data}` envelope
    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>> {
        let url = format!("{}/v2/vectordb/{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::vector_db(format!("Milvus {} failed: {}", path, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::vector_db(format!(
                "Milvus {} failed ({}): {}",
                path, status, body
            )));
        }

        let envelope: MilvusResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::vector_db(format!("Failed to parse Milvus response: {}", e)))?;

        if envelope.code != 0 {
            return Err(Error::vector_db(format!(
                "Milvus {} returned code {}: {}",
                path,
                envelope.code,
                envelope.message.unwrap_or_default()
            )));
        }

        Ok(envelope.data)
    }

    /// Build an `in` filter over the identity field
    fn identity_filter(&self, identities: &[String]) -> String {
        let quoted: Vec<String> = identities
            .iter()
            .map(|id| format!("\"{}\"", escape_filter_literal(id)))
            .collect();
        format!("{} in [{}]", self.identity_field, quoted.join(","))
    }

    /// Convert a record to an insert row
    fn record_to_row(&self, record: &IndexedRecord) -> serde_json::Value {
        let mut row = serde_json::Map::new();
        row.insert(self.identity_field.clone(), record.content_identity.clone().into());
        row.insert("filename".to_string(), record.source_key.clone().into());
        row.insert("chunk_id".to_string(), record.chunk_index.into());
        row.insert("text".to_string(), record.text.clone().into());
        row.insert("vector".to_string(), serde_json::json!(record.vector));
        serde_json::Value::Object(row)
    }
}

/// Escape a string for use inside a double-quoted Milvus filter literal
fn escape_filter_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl VectorStoreProvider for MilvusVectorStore {
    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        let request = CollectionRequest {
            collection_name: &self.collection,
        };

        let exists = self
            .post::<_, HasCollection>("collections/has", &request)
            .await?
            .map(|h| h.has)
            .unwrap_or(false);

        if exists {
            tracing::info!("Collection '{}' already exists", self.collection);
        } else {
            let create = CreateCollectionRequest {
                collection_name: &self.collection,
                dimension: dimensions,
                metric_type: "COSINE",
                id_type: "Int64",
                auto_id: true,
                primary_field_name: "id",
                vector_field_name: "vector",
                params: CreateParams {
                    enable_dynamic_field: true,
                },
            };
            self.post::<_, serde_json::Value>("collections/create", &create)
                .await?;
            tracing::info!("Collection '{}' created ({} dims)", self.collection, dimensions);
        }

        self.post::<_, serde_json::Value>("collections/load", &request)
            .await?;
        Ok(())
    }

    async fn query_identities(&self, identities: &[String], limit: usize) -> Result<Vec<String>> {
        if identities.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let request = QueryRequest {
            collection_name: &self.collection,
            filter: self.identity_filter(identities),
            output_fields: vec![self.identity_field.as_str()],
            limit,
        };

        let rows: Vec<HashMap<String, serde_json::Value>> = self
            .post("entities/query", &request)
            .await?
            .unwrap_or_default();

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                row.get(&self.identity_field)
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            })
            .collect())
    }

    async fn insert_records(&self, records: &[IndexedRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let request = InsertRequest {
            collection_name: &self.collection,
            data: records.iter().map(|r| self.record_to_row(r)).collect(),
        };

        let result: Option<InsertResult> = self.post("entities/insert", &request).await?;
        let inserted = result.map(|r| r.insert_count).unwrap_or(records.len());

        if inserted != records.len() {
            return Err(Error::vector_db(format!(
                "Milvus inserted {} of {} records",
                inserted,
                records.len()
            )));
        }

        Ok(inserted)
    }

    async fn len(&self) -> Result<usize> {
        let request = CollectionRequest {
            collection_name: &self.collection,
        };
        let stats: Option<CollectionStats> = self.post("collections/get_stats", &request).await?;
        Ok(stats.map(|s| s.row_count).unwrap_or(0))
    }

    async fn health_check(&self) -> Result<bool> {
        let request = CollectionRequest {
            collection_name: &self.collection,
        };
        Ok(self
            .post::<_, HasCollection>("collections/has", &request)
            .await
            .is_ok())
    }

    fn name(&self) -> &str {
        "milvus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MilvusVectorStore {
        MilvusVectorStore::new(&VectorDbConfig::default()).unwrap()
    }

    #[test]
    fn test_identity_filter() {
        let filter = store().identity_filter(&["abc".to_string(), "d\"ef".to_string()]);
        assert_eq!(filter, r#"etag in ["abc","d\"ef"]"#);
    }

    #[test]
    fn test_record_row_fields() {
        let record = IndexedRecord {
            content_identity: "abc".to_string(),
            source_key: "docs/a.pdf".to_string(),
            chunk_index: 3,
            text: "hello".to_string(),
            vector: vec![0.5, 0.25],
        };
        let row = store().record_to_row(&record);
        assert_eq!(row["etag"], "abc");
        assert_eq!(row["filename"], "docs/a.pdf");
        assert_eq!(row["chunk_id"], 3);
        assert_eq!(row["vector"].as_array().unwrap().len(), 2);
        assert!(row.get("id").is_none());
    }
}
