use async_trait::async_trait;
use log::info;
use serde_json::Value;
use std::error::Error as StdError;
use std::path::Path;

use super::{ record_grounding_data, DocumentRetriever, RetrievalError };
use crate::models::chat::{ ChatMessage, Context, Document };

/// Serves documents from a local JSON catalog, for offline runs.
///
/// No ranking happens here: the first `limit` entries are returned as-is.
pub struct CatalogRetriever {
    documents: Vec<Document>,
    limit: usize,
}

impl CatalogRetriever {
    pub fn new(documents: Vec<Document>, limit: usize) -> Self {
        Self { documents, limit }
    }

    pub async fn from_path(path: &Path, limit: usize) -> Result<Self, RetrievalError> {
        let display = path.display().to_string();
        let raw = tokio::fs::read_to_string(path).await.map_err(|source| RetrievalError::CatalogIo {
            path: display.clone(),
            source,
        })?;
        let parsed: Value = serde_json
            ::from_str(&raw)
            .map_err(|source| RetrievalError::CatalogFormat { path: display.clone(), source })?;
        match parsed {
            Value::Array(documents) => Ok(Self::new(documents, limit)),
            _ => Err(RetrievalError::NotAnArray(display)),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentRetriever for CatalogRetriever {
    async fn get_product_documents(
        &self,
        _messages: &[ChatMessage],
        context: &mut Context
    ) -> Result<Vec<Document>, Box<dyn StdError + Send + Sync>> {
        let documents: Vec<Document> = self.documents.iter().take(self.limit).cloned().collect();
        info!("📄 {} documents retrieved from catalog", documents.len());
        record_grounding_data(context, &documents);
        Ok(documents)
    }
}
