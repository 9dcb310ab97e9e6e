//! Knowledge-base search tool
//!
//! The retrieval pipeline (chunking, embedding, vector indexing) lives
//! outside this workspace; this module only consumes its search capability
//! through the [`SearchProvider`] seam and exposes it as a callable tool.

use crate::args;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use toolbus_core::{ArgMap, BusError, ParamSpec, Tool};
use tracing::debug;

const DEFAULT_TOP_K: i64 = 5;
const DEFAULT_COLLECTION: &str = "default";

/// One ranked passage returned from the knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// Passage text
    pub text: String,
    /// Similarity score, higher is better
    pub score: f64,
    /// Where the passage came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// The retrieval capability this crate consumes but does not implement
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return the `top_k` best-matching passages for a query
    async fn search(
        &self,
        query: &str,
        collection: &str,
        top_k: usize,
    ) -> Result<Vec<Passage>, BusError>;
}

/// Search a knowledge base through an injected provider
pub struct SearchKnowledgeTool {
    provider: Arc<dyn SearchProvider>,
}

impl SearchKnowledgeTool {
    /// Create the tool over a provider
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        "search_knowledge"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for passages relevant to a query"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::string("query", "Search query"),
            ParamSpec::integer("top_k", "Number of passages to return").with_default(DEFAULT_TOP_K),
            ParamSpec::string("collection_name", "Knowledge base collection to search")
                .with_default(DEFAULT_COLLECTION),
        ]
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        let query = args::string(&arguments, "query")?;
        let top_k = args::integer(&arguments, "top_k")?.max(0) as usize;
        let collection = args::string(&arguments, "collection_name")?;

        debug!(query = %query, collection = %collection, top_k, "searching knowledge base");
        let passages = self.provider.search(query, collection, top_k).await?;
        Ok(json!(passages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider;

    #[async_trait]
    impl SearchProvider for StaticProvider {
        async fn search(
            &self,
            query: &str,
            collection: &str,
            top_k: usize,
        ) -> Result<Vec<Passage>, BusError> {
            assert_eq!(collection, "default");
            Ok((0..top_k)
                .map(|i| Passage {
                    text: format!("{} passage {}", query, i),
                    score: 1.0 - i as f64 * 0.1,
                    source: None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_defaults_applied_through_binding() {
        let tool = SearchKnowledgeTool::new(Arc::new(StaticProvider));

        let mut supplied = ArgMap::new();
        supplied.insert("query".to_string(), json!("manuals"));
        let bound =
            toolbus_core::bind_arguments(&tool.descriptor(), &supplied).unwrap();

        let value = tool.invoke(bound).await.unwrap();
        let passages = value.as_array().unwrap();
        assert_eq!(passages.len(), 5);
        assert!(passages[0]["text"].as_str().unwrap().starts_with("manuals"));
    }
}
