//! Stub collaborators shared by unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::error::Error as StdError;
use std::sync::Mutex;

use crate::config::prompt::PROMPTY_EXTENSION;
use crate::llm::chat::{ ChatClient, ChatCompletion, CompletionError };
use crate::llm::InvocationParameters;
use crate::models::chat::{ ChatMessage, Context, Document };
use crate::orchestrator::GROUNDED_CHAT_PROMPT;
use crate::rag::{ DocumentRetriever, RetrievalError };

pub fn write_prompt(source: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("{}.{}", GROUNDED_CHAT_PROMPT, PROMPTY_EXTENSION));
    std::fs::write(path, source).unwrap();
    dir
}

/// Serves `app` on an ephemeral local port for the rest of the test.
pub async fn spawn_server(app: axum::Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub struct StubRetriever {
    documents: Vec<Document>,
    additions: Context,
}

impl StubRetriever {
    pub fn returning(documents: Vec<Document>) -> Self {
        Self { documents, additions: Context::new() }
    }

    pub fn recording(mut self, key: &str, value: Value) -> Self {
        self.additions.insert(key.to_string(), value);
        self
    }
}

#[async_trait]
impl DocumentRetriever for StubRetriever {
    async fn get_product_documents(
        &self,
        _messages: &[ChatMessage],
        context: &mut Context
    ) -> Result<Vec<Document>, Box<dyn StdError + Send + Sync>> {
        for (key, value) in &self.additions {
            context.insert(key.clone(), value.clone());
        }
        Ok(self.documents.clone())
    }
}

pub struct FailingRetriever;

#[async_trait]
impl DocumentRetriever for FailingRetriever {
    async fn get_product_documents(
        &self,
        _messages: &[ChatMessage],
        _context: &mut Context
    ) -> Result<Vec<Document>, Box<dyn StdError + Send + Sync>> {
        Err(Box::new(RetrievalError::Status { status: 503, body: "search index offline".into() }))
    }
}

type Call = (String, Vec<ChatMessage>, InvocationParameters);

pub struct StubChatClient {
    reply: Option<ChatMessage>,
    calls: Mutex<Vec<Call>>,
}

impl StubChatClient {
    pub fn replying(content: &str) -> Self {
        Self { reply: Some(ChatMessage::assistant(content)), calls: Mutex::new(Vec::new()) }
    }

    pub fn with_no_choices() -> Self {
        Self { reply: None, calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for StubChatClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        parameters: &InvocationParameters
    ) -> Result<ChatCompletion, Box<dyn StdError + Send + Sync>> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), messages.to_vec(), parameters.clone()));
        Ok(match &self.reply {
            Some(message) => ChatCompletion::from_message(message.clone()),
            None => ChatCompletion { choices: Vec::new() },
        })
    }

    fn endpoint(&self) -> String {
        "stub://chat".to_string()
    }
}

pub struct FailingChatClient;

#[async_trait]
impl ChatClient for FailingChatClient {
    async fn complete(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _parameters: &InvocationParameters
    ) -> Result<ChatCompletion, Box<dyn StdError + Send + Sync>> {
        Err(Box::new(CompletionError::Status { status: 401, body: "unauthorized".into() }))
    }

    fn endpoint(&self) -> String {
        "stub://failing".to_string()
    }
}
