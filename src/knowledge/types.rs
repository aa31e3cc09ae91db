//! Typed shapes for knowledge client requests and responses.
//!
//! Response types are lenient: the substrate's backends disagree on field
//! names (`score` vs `confidence`, `text` vs `content`), send numeric ids, and
//! use `null` for absent values. Items are read field by field so none of that
//! fails a whole result list.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// One piece of retrieved knowledge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawItem")]
pub struct KnowledgeItem {
    /// Opaque substrate identifier.
    pub id: String,
    pub content: String,
    /// Relevance or confidence in `[0.0, 1.0]`. Only used for display ordering.
    pub confidence: f64,
    pub title: Option<String>,
    pub domain: Option<String>,
    pub tags: Vec<String>,
}

/// Wire form of an item. Every alias is its own field, so an item carrying
/// both `id` and `memory_id` is not a duplicate-field error.
#[derive(Default, Deserialize)]
#[serde(default)]
struct RawItem {
    id: Value,
    memory_id: Value,
    article_id: Value,
    source_id: Value,
    content: Value,
    text: Value,
    body: Value,
    confidence: Value,
    score: Value,
    relevance: Value,
    title: Value,
    domain: Value,
    category: Value,
    tags: Value,
}

fn first_text(candidates: &[&Value]) -> Option<String> {
    candidates.iter().find_map(|value| match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

impl From<RawItem> for KnowledgeItem {
    fn from(raw: RawItem) -> Self {
        let tags = match &raw.tags {
            Value::Array(items) => items
                .iter()
                .filter_map(|tag| tag.as_str().map(str::to_string))
                .collect(),
            Value::String(tag) if !tag.is_empty() => vec![tag.clone()],
            _ => Vec::new(),
        };
        Self {
            id: first_text(&[&raw.id, &raw.memory_id, &raw.article_id, &raw.source_id])
                .unwrap_or_default(),
            content: first_text(&[&raw.content, &raw.text, &raw.body]).unwrap_or_default(),
            confidence: [&raw.confidence, &raw.score, &raw.relevance]
                .iter()
                .find_map(|value| value.as_f64())
                .unwrap_or(0.0),
            title: first_text(&[&raw.title]),
            domain: first_text(&[&raw.domain, &raw.category]),
            tags,
        }
    }
}

/// Read a list of items, skipping entries that aren't objects or carry no
/// content.
pub(crate) fn items_from_values(values: Vec<Value>) -> Vec<KnowledgeItem> {
    let total = values.len();
    let items: Vec<KnowledgeItem> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<KnowledgeItem>(value).ok())
        .filter(|item| !item.content.trim().is_empty())
        .collect();
    if items.len() < total {
        debug!(skipped = total - items.len(), "ignored unusable items in response");
    }
    items
}

/// `deserialize_with` for item lists that may be `null` or hold bad entries.
fn lenient_items<'de, D>(deserializer: D) -> Result<Vec<KnowledgeItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(items_from_values(values.unwrap_or_default()))
}

impl KnowledgeItem {
    /// Grouping label: explicit domain, else the first tag, else `general`.
    pub fn domain_label(&self) -> &str {
        self.domain
            .as_deref()
            .filter(|d| !d.is_empty())
            .or_else(|| self.tags.first().map(String::as_str))
            .unwrap_or("general")
    }
}

/// Optional narrowing for `recall`.
#[derive(Debug, Clone, Default)]
pub struct RecallFilters {
    pub min_confidence: Option<f64>,
    pub tags: Vec<String>,
}

/// Optional attributes for `store`.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Where the content came from, e.g. a session id.
    pub context: Option<String>,
    pub importance: Option<f64>,
    pub tags: Vec<String>,
}

/// A raw document to ingest as a source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInput {
    pub title: String,
    pub content: String,
    pub source_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Results of `knowledge.search`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchResults {
    #[serde(deserialize_with = "lenient_items")]
    pub articles: Vec<KnowledgeItem>,
    #[serde(deserialize_with = "lenient_items")]
    pub sources: Vec<KnowledgeItem>,
}

/// Result of `knowledge.compile`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileOutcome {
    /// Ids of articles created or updated by the compile.
    pub article_ids: Vec<String>,
}

/// Outcome of a health check. Never an error: unreachability is data.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthStatus {
    pub reachable: bool,
    pub version: Option<String>,
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_accepts_alternate_field_names() {
        let item: KnowledgeItem = serde_json::from_value(serde_json::json!({
            "memory_id": "m-7",
            "text": "Prefers tabs",
            "score": 0.8,
            "tags": ["style"]
        }))
        .unwrap();
        assert_eq!(item.id, "m-7");
        assert_eq!(item.content, "Prefers tabs");
        assert_eq!(item.confidence, 0.8);
        assert_eq!(item.domain_label(), "style");
    }

    #[test]
    fn domain_label_defaults_to_general() {
        let item = KnowledgeItem {
            content: "x".into(),
            ..Default::default()
        };
        assert_eq!(item.domain_label(), "general");

        let item = KnowledgeItem {
            domain: Some("infra".into()),
            tags: vec!["ops".into()],
            ..Default::default()
        };
        assert_eq!(item.domain_label(), "infra");
    }

    #[test]
    fn item_with_id_and_memory_id_uses_id() {
        let item: KnowledgeItem = serde_json::from_value(serde_json::json!({
            "id": "m-1",
            "memory_id": "m-1-legacy",
            "content": "Deploys need two approvals",
            "confidence": 0.9
        }))
        .unwrap();
        assert_eq!(item.id, "m-1");
        assert_eq!(item.confidence, 0.9);
    }

    #[test]
    fn item_tolerates_numeric_ids_and_nulls() {
        let item: KnowledgeItem = serde_json::from_value(serde_json::json!({
            "id": 7,
            "content": "Uses tokio",
            "confidence": null,
            "score": 0.4,
            "tags": null,
            "title": null
        }))
        .unwrap();
        assert_eq!(item.id, "7");
        assert_eq!(item.confidence, 0.4);
        assert!(item.tags.is_empty());
        assert!(item.title.is_none());
    }

    #[test]
    fn item_lists_skip_unusable_entries() {
        let items = items_from_values(vec![
            serde_json::json!({"id": "m-1", "content": "kept", "confidence": 0.5}),
            serde_json::json!("stray text"),
            serde_json::json!({"id": "m-2", "content": null}),
            serde_json::json!({"memory_id": 3, "text": "also kept", "tags": ["a", 1, "b"]}),
        ]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, "3");
        assert_eq!(items[1].tags, vec!["a", "b"]);
    }

    #[test]
    fn search_results_accept_null_lists() {
        let results: SearchResults = serde_json::from_value(serde_json::json!({
            "articles": [{"article_id": "a-1", "content": "Two approvals", "score": null}],
            "sources": null
        }))
        .unwrap();
        assert_eq!(results.articles[0].id, "a-1");
        assert!(results.sources.is_empty());
    }
}
