use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use url::Url;

use super::{ DocumentRetriever, RetrievalError };
use crate::models::chat::{ ChatMessage, Context, Document };

/// Client for a remote product search service.
///
/// The service receives the conversation and the caller's context and answers
/// with the documents to ground on, optionally with context entries to record.
pub struct HttpRetriever {
    http: HttpClient,
    url: Url,
    limit: usize,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    messages: &'a [ChatMessage],
    context: &'a Context,
    top: usize,
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    documents: Vec<Document>,
    #[serde(default)]
    context: Option<Context>,
}

impl HttpRetriever {
    pub fn new(url: Url, limit: usize) -> Result<Self, RetrievalError> {
        let http = HttpClient::builder().build()?;
        Ok(Self { http, url, limit })
    }
}

fn merge_context(context: &mut Context, returned: Option<Context>) {
    if let Some(returned) = returned {
        for (key, value) in returned {
            context.insert(key, value);
        }
    }
}

#[async_trait]
impl DocumentRetriever for HttpRetriever {
    async fn get_product_documents(
        &self,
        messages: &[ChatMessage],
        context: &mut Context
    ) -> Result<Vec<Document>, Box<dyn StdError + Send + Sync>> {
        debug!("Requesting product documents from {}", self.url);
        let resp = {
            let req = SearchRequest { messages, context: &*context, top: self.limit };
            self.http
                .post(self.url.clone())
                .json(&req)
                .send().await
                .map_err(RetrievalError::from)?
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Box::new(RetrievalError::Status { status: status.as_u16(), body }));
        }

        let search: SearchResponse = resp.json().await.map_err(RetrievalError::from)?;
        info!("📄 {} documents retrieved", search.documents.len());
        merge_context(context, search.context);
        Ok(search.documents)
    }
}
