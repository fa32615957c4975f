pub mod catalog;
pub mod http;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use log::info;

use self::catalog::CatalogRetriever;
use self::http::HttpRetriever;
use crate::config::project::parse_url;
use crate::models::chat::{ ChatMessage, Context, Document };

/// Context key under which retrievers append the documents they returned.
pub const GROUNDING_DATA_KEY: &str = "grounding_data";

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("product search request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("product search returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("failed to read product catalog '{path}': {source}")]
    CatalogIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse product catalog '{path}': {source}")]
    CatalogFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("product catalog '{0}' must be a JSON array of documents")]
    NotAnArray(String),
    #[error("{0} is required for the selected retriever")]
    MissingSetting(&'static str),
}

/// Finds the grounding documents for the latest turn of a conversation.
///
/// Implementations may record side information into `context`; whatever they
/// add is returned to the caller in the response envelope.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn get_product_documents(
        &self,
        messages: &[ChatMessage],
        context: &mut Context
    ) -> Result<Vec<Document>, Box<dyn StdError + Send + Sync>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieverType {
    Http,
    Catalog,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseRetrieverTypeError {
    message: String,
}

impl fmt::Display for ParseRetrieverTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for ParseRetrieverTypeError {}

impl FromStr for RetrieverType {
    type Err = ParseRetrieverTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(RetrieverType::Http),
            "catalog" => Ok(RetrieverType::Catalog),
            _ =>
                Err(ParseRetrieverTypeError {
                    message: format!("Invalid retriever type: '{}' (expected http or catalog)", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub retriever_type: RetrieverType,
    pub url: Option<String>,
    pub catalog_path: PathBuf,
    pub limit: usize,
}

pub async fn new_retriever(
    config: &RetrieverConfig
) -> Result<Arc<dyn DocumentRetriever>, Box<dyn StdError + Send + Sync>> {
    let retriever: Arc<dyn DocumentRetriever> = match config.retriever_type {
        RetrieverType::Http => {
            let raw = config.url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .ok_or(RetrievalError::MissingSetting("PRODUCT_SEARCH_URL"))?;
            let url = parse_url(raw)?;
            info!("Retriever configured: Type=http, Url={}, Limit={}", url, config.limit);
            Arc::new(HttpRetriever::new(url, config.limit)?)
        }
        RetrieverType::Catalog => {
            let retriever = CatalogRetriever::from_path(&config.catalog_path, config.limit).await?;
            info!(
                "Retriever configured: Type=catalog, Path={}, Documents={}, Limit={}",
                config.catalog_path.display(),
                retriever.len(),
                config.limit
            );
            Arc::new(retriever)
        }
    };
    Ok(retriever)
}

/// Appends `documents` to the list kept under [`GROUNDING_DATA_KEY`].
pub fn record_grounding_data(context: &mut Context, documents: &[Document]) {
    let entry = context
        .entry(GROUNDING_DATA_KEY.to_string())
        .or_insert_with(|| serde_json::Value::Array(Vec::new()));
    match entry {
        serde_json::Value::Array(items) => items.push(serde_json::Value::Array(documents.to_vec())),
        other => {
            let previous = other.take();
            *other = serde_json::Value::Array(
                vec![previous, serde_json::Value::Array(documents.to_vec())]
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn retriever_type_parses_case_insensitively() {
        assert_eq!("HTTP".parse::<RetrieverType>().unwrap(), RetrieverType::Http);
        assert_eq!(" catalog ".parse::<RetrieverType>().unwrap(), RetrieverType::Catalog);
        assert!("qdrant".parse::<RetrieverType>().is_err());
    }

    #[test]
    fn grounding_data_accumulates_per_call() {
        let mut context = Context::new();
        record_grounding_data(&mut context, &[json!({ "id": "1" })]);
        record_grounding_data(&mut context, &[]);
        assert_eq!(context.get(GROUNDING_DATA_KEY), Some(&json!([[{ "id": "1" }], []])));
    }

    #[test]
    fn grounding_data_keeps_foreign_value() {
        let mut context = Context::new();
        context.insert(GROUNDING_DATA_KEY.into(), json!("caller value"));
        record_grounding_data(&mut context, &[json!(1)]);
        assert_eq!(context.get(GROUNDING_DATA_KEY), Some(&json!(["caller value", [1]])));
    }

    #[tokio::test]
    async fn http_retriever_requires_url() {
        let config = RetrieverConfig {
            retriever_type: RetrieverType::Http,
            url: None,
            catalog_path: PathBuf::from("unused.json"),
            limit: 5,
        };
        let err = new_retriever(&config).await.err().unwrap();
        let err = err.downcast_ref::<RetrievalError>().unwrap();
        assert!(matches!(err, RetrievalError::MissingSetting("PRODUCT_SEARCH_URL")));
    }
}
