//! Retrieved article: the unit of structured payload on the outward stream.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A news article returned by vector search or named by a model payload.
///
/// Serialized with camelCase keys. Deserialization also accepts the
/// document-store spellings (`_id`, `pubDate`) and extended-JSON wrappers
/// such as `{"$oid": "..."}` and `{"$date": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedArticle {
    #[serde(default, alias = "_id", deserialize_with = "extended_string")]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub link: String,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub article_type: String,

    #[serde(default, alias = "pubDate", deserialize_with = "extended_string")]
    pub publish_date: String,

    /// Similarity score in [0, 1]
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: f32,
}

fn extended_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(flatten_extended(&value))
}

/// Model-written payloads sometimes carry `null` or quoted scores.
fn lenient_score<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match flatten_extended(&value) {
        text if text.is_empty() => Ok(0.0),
        text => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid score: {text}"))),
    }
}

/// Collapse an extended-JSON scalar into a plain string.
fn flatten_extended(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        Value::Object(map) => ["$oid", "$date", "$numberLong", "$numberDouble"]
            .iter()
            .find_map(|key| map.get(*key))
            .map(flatten_extended)
            .unwrap_or_default(),
        other => other.to_string(),
    }
}
