//! MongoDB Atlas vector search over the Atlas Data API.
//!
//! Runs one `aggregate` action per query with a `$vectorSearch` stage
//! followed by projection, score threshold, sort and limit.

use async_trait::async_trait;
use newsdesk_config::IndexConfig;
use newsdesk_core::{IndexError, RetrievedArticle, VectorIndex, VectorQuery};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Connection settings for one Atlas collection.
#[derive(Clone)]
pub struct AtlasSettings {
    pub endpoint: String,
    pub api_key: String,
    pub data_source: String,
    pub database: String,
    pub collection: String,
    pub index_name: String,
    /// Document field holding the embedding
    pub path: String,
}

impl std::fmt::Debug for AtlasSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("data_source", &self.data_source)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("index_name", &self.index_name)
            .field("path", &self.path)
            .finish()
    }
}

impl AtlasSettings {
    pub fn from_config(config: &IndexConfig) -> Result<Self, IndexError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| IndexError::NotConfigured("index.endpoint is not set".into()))?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            IndexError::NotConfigured(
                "index.api_key is not set (or NEWSDESK_ATLAS_API_KEY)".into(),
            )
        })?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            data_source: config.data_source.clone(),
            database: config.database.clone(),
            collection: config.collection.clone(),
            index_name: config.index_name.clone(),
            path: config.path.clone(),
        })
    }
}

pub struct AtlasVectorIndex {
    settings: AtlasSettings,
    client: reqwest::Client,
}

impl AtlasVectorIndex {
    pub fn new(settings: AtlasSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { settings, client }
    }

    /// The aggregation pipeline for one query.
    pub fn pipeline(&self, query: &VectorQuery) -> Value {
        json!([
            {
                "$vectorSearch": {
                    "index": self.settings.index_name,
                    "path": self.settings.path,
                    "queryVector": query.vector,
                    "numCandidates": query.num_candidates,
                    "limit": query.limit,
                }
            },
            {
                "$project": {
                    "_id": 1,
                    "title": 1,
                    "content": 1,
                    "link": 1,
                    "articleType": 1,
                    "pubDate": 1,
                    "score": { "$meta": "vectorSearchScore" },
                }
            },
            { "$match": { "score": { "$gte": query.min_score } } },
            { "$sort": { "score": -1 } },
            { "$limit": query.limit },
        ])
    }

    fn action_body(&self, pipeline: Value) -> Value {
        json!({
            "dataSource": self.settings.data_source,
            "database": self.settings.database,
            "collection": self.settings.collection,
            "pipeline": pipeline,
        })
    }

    async fn post_action(&self, action: &str, body: &Value) -> Result<Value, IndexError> {
        let url = format!("{}/action/{action}", self.settings.endpoint);

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.settings.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Atlas returned error");
            return Err(IndexError::Request(format!("status {status}: {error_body}")));
        }

        response
            .json()
            .await
            .map_err(|e| IndexError::InvalidResponse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    documents: Vec<RetrievedArticle>,
}

#[async_trait]
impl VectorIndex for AtlasVectorIndex {
    fn name(&self) -> &str {
        "atlas"
    }

    async fn search(&self, query: &VectorQuery) -> Result<Vec<RetrievedArticle>, IndexError> {
        debug!(
            collection = %self.settings.collection,
            index = %self.settings.index_name,
            num_candidates = query.num_candidates,
            limit = query.limit,
            "Running Atlas vector search"
        );

        let body = self.action_body(self.pipeline(query));
        let raw = self.post_action("aggregate", &body).await?;
        let parsed: AggregateResponse = serde_json::from_value(raw)
            .map_err(|e| IndexError::InvalidResponse(format!("unexpected aggregate payload: {e}")))?;

        Ok(parsed.documents)
    }

    async fn health_check(&self) -> Result<bool, IndexError> {
        let body = self.action_body(json!([{ "$limit": 1 }]));
        self.post_action("aggregate", &body).await.map(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AtlasSettings {
        AtlasSettings {
            endpoint: "https://data.example.com/app/x/endpoint/data/v1".into(),
            api_key: "secret".into(),
            data_source: "Cluster0".into(),
            database: "test".into(),
            collection: "articles".into(),
            index_name: "vector_index".into(),
            path: "embedding".into(),
        }
    }

    #[test]
    fn pipeline_shape() {
        let index = AtlasVectorIndex::new(settings());
        let pipeline = index.pipeline(&VectorQuery {
            vector: vec![0.1, 0.2],
            num_candidates: 100,
            limit: 5,
            min_score: 0.7,
        });

        let stages = pipeline.as_array().unwrap();
        assert_eq!(stages.len(), 5);
        let search = &stages[0]["$vectorSearch"];
        assert_eq!(search["index"], "vector_index");
        assert_eq!(search["path"], "embedding");
        assert_eq!(search["numCandidates"], 100);
        assert_eq!(search["limit"], 5);
        assert_eq!(stages[1]["$project"]["score"]["$meta"], "vectorSearchScore");
        assert!((stages[2]["$match"]["score"]["$gte"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(stages[3]["$sort"]["score"], -1);
        assert_eq!(stages[4]["$limit"], 5);
    }

    #[test]
    fn aggregate_documents_normalize_extended_json() {
        let raw = json!({
            "documents": [{
                "_id": {"$oid": "65a1"},
                "title": "Senate race tightens",
                "link": "https://news.example.com/senate",
                "content": "Votes are being counted.",
                "articleType": "Politics",
                "pubDate": {"$date": "2025-01-05T00:00:00Z"},
                "score": 0.88
            }]
        });
        let parsed: AggregateResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.documents[0].id, "65a1");
        assert_eq!(parsed.documents[0].publish_date, "2025-01-05T00:00:00Z");
    }

    #[test]
    fn settings_require_endpoint_and_key() {
        let config = IndexConfig::default();
        assert!(matches!(
            AtlasSettings::from_config(&config),
            Err(IndexError::NotConfigured(_))
        ));

        let config = IndexConfig {
            endpoint: Some("https://data.example.com/v1/".into()),
            api_key: Some("k".into()),
            ..IndexConfig::default()
        };
        let settings = AtlasSettings::from_config(&config).unwrap();
        assert_eq!(settings.endpoint, "https://data.example.com/v1");
        assert!(!format!("{settings:?}").contains("\"k\""));
    }
}
