pub mod azure;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use self::azure::AzureInferenceChatClient;
use super::InvocationParameters;
use crate::config::credential::Credential;
use crate::models::chat::ChatMessage;

pub const DEFAULT_API_VERSION: &str = "2024-05-01-preview";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("chat completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat completion endpoint returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("failed to decode chat completion response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("chat completion returned no choices")]
    NoChoices,
    #[error("chat completion choice {0} has no text content")]
    EmptyContent(usize),
    #[error("invalid chat completion endpoint '{0}'")]
    InvalidEndpoint(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub choices: Vec<Choice>,
}

impl ChatCompletion {
    pub fn from_message(message: ChatMessage) -> Self {
        Self {
            choices: vec![Choice { message, finish_reason: Some("stop".to_string()) }],
        }
    }

    pub fn into_first_message(self) -> Result<ChatMessage, CompletionError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or(CompletionError::NoChoices)
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        parameters: &InvocationParameters
    ) -> Result<ChatCompletion, Box<dyn StdError + Send + Sync>>;

    fn endpoint(&self) -> String;
}

#[derive(Debug)]
pub struct ChatClientConfig {
    pub endpoint: Url,
    pub api_version: String,
    pub credential: Credential,
}

pub fn new_client(
    config: ChatClientConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client = AzureInferenceChatClient::new(
        config.endpoint,
        config.api_version,
        config.credential
    )?;
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_message_is_taken() {
        let completion = ChatCompletion {
            choices: vec![
                Choice { message: ChatMessage::assistant("first"), finish_reason: None },
                Choice { message: ChatMessage::assistant("second"), finish_reason: None }
            ],
        };
        assert_eq!(completion.into_first_message().unwrap(), ChatMessage::assistant("first"));
    }

    #[test]
    fn no_choices_is_an_error() {
        let completion = ChatCompletion { choices: vec![] };
        assert!(matches!(completion.into_first_message(), Err(CompletionError::NoChoices)));
    }
}
