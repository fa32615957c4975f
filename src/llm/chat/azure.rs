use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use url::Url;
use uuid::Uuid;

use super::{ ChatClient, ChatCompletion, Choice, CompletionError };
use crate::config::credential::Credential;
use crate::llm::InvocationParameters;
use crate::models::chat::{ ChatMessage, Role };

const REQUEST_ID_HEADER: &str = "x-ms-client-request-id";
/// Without it the service rejects body fields it does not know.
const EXTRA_PARAMETERS_HEADER: &str = "extra-parameters";
const PASS_THROUGH: &str = "pass-through";

/// Chat completions against a hosted Azure AI model inference endpoint.
pub struct AzureInferenceChatClient {
    http: HttpClient,
    endpoint: Url,
    completions_url: Url,
    credential: Credential,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(flatten)]
    parameters: &'a InvocationParameters,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    role: Role,
    #[serde(default)]
    content: Option<String>,
}

impl AzureInferenceChatClient {
    pub fn new(
        endpoint: Url,
        api_version: String,
        credential: Credential
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let completions_url = completions_url(&endpoint, &api_version)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        info!("Chat client configured: Endpoint={}, ApiVersion={}", endpoint, api_version);

        Ok(Self {
            http,
            endpoint,
            completions_url,
            credential,
        })
    }
}

fn completions_url(endpoint: &Url, api_version: &str) -> Result<Url, CompletionError> {
    let base = endpoint.as_str().trim_end_matches('/');
    let mut url = Url::parse(&format!("{}/chat/completions", base)).map_err(|_|
        CompletionError::InvalidEndpoint(endpoint.to_string())
    )?;
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url)
}

fn parse_completion(body: &str) -> Result<ChatCompletion, CompletionError> {
    let response: CompletionResponse = serde_json::from_str(body)?;
    let choices = response.choices
        .into_iter()
        .enumerate()
        .map(|(index, choice)| -> Result<Choice, CompletionError> {
            let content = choice.message.content.ok_or(CompletionError::EmptyContent(index))?;
            Ok(Choice {
                message: ChatMessage::new(choice.message.role, content),
                finish_reason: choice.finish_reason,
            })
        })
        .collect::<Result<Vec<_>, CompletionError>>()?;
    Ok(ChatCompletion { choices })
}

#[async_trait]
impl ChatClient for AzureInferenceChatClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        parameters: &InvocationParameters
    ) -> Result<ChatCompletion, Box<dyn StdError + Send + Sync>> {
        let request_id = Uuid::new_v4();
        let req = CompletionRequest { model, messages, parameters };
        debug!(
            "Sending chat completion {} to {} with {} messages",
            request_id,
            self.completions_url,
            messages.len()
        );

        let (auth_name, auth_value) = self.credential.header().await?;

        let mut request = self.http
            .post(self.completions_url.clone())
            .header(auth_name, auth_value)
            .header(REQUEST_ID_HEADER, request_id.to_string());
        if !parameters.extra.is_empty() {
            request = request.header(EXTRA_PARAMETERS_HEADER, PASS_THROUGH);
        }
        let resp = request.json(&req).send().await.map_err(CompletionError::from)?;

        let status = resp.status();
        let body = resp.text().await.map_err(CompletionError::from)?;
        if !status.is_success() {
            return Err(Box::new(CompletionError::Status { status: status.as_u16(), body }));
        }

        Ok(parse_completion(&body)?)
    }

    fn endpoint(&self) -> String {
        self.endpoint.to_string()
    }
}
