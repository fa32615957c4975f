use crate::cli::Args;
use crate::config::credential::{ Credential, COGNITIVE_SERVICES_RESOURCE, MANAGEMENT_RESOURCE };
use crate::config::project::{ parse_url, ConfigError, ProjectClient, ProjectConnection };
use crate::config::prompt::PromptTemplate;
use crate::llm::chat::{ new_client as new_chat_client, ChatClient, ChatClientConfig };
use crate::models::chat::{ ChatMessage, Context, ResponseEnvelope };
use crate::rag::{ new_retriever, DocumentRetriever, RetrieverConfig, RetrieverType };

use log::info;
use std::error::Error;
use url::Url;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

pub const GROUNDED_CHAT_PROMPT: &str = "grounded_chat";

/// Answers product questions: retrieve documents, render the grounded chat
/// prompt, ask the model.
///
/// Clients are built once and shared read-only; nothing else outlives a call.
#[derive(Clone)]
pub struct ChatOrchestrator {
    retriever: Arc<dyn DocumentRetriever>,
    chat_client: Arc<dyn ChatClient>,
    model: String,
    asset_path: PathBuf,
}

impl ChatOrchestrator {
    pub fn new(
        retriever: Arc<dyn DocumentRetriever>,
        chat_client: Arc<dyn ChatClient>,
        model: impl Into<String>,
        asset_path: impl Into<PathBuf>
    ) -> Self {
        Self {
            retriever,
            chat_client,
            model: model.into(),
            asset_path: asset_path.into(),
        }
    }

    pub async fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let connection: ProjectConnection = args.connection_string
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("AIPROJECT_CONNECTION_STRING"))?
            .parse()?;
        let model = args.chat_model
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("CHAT_MODEL"))?;

        info!(
            "Project: {} (resource group {}, host {})",
            connection.project_name,
            connection.resource_group,
            connection.host
        );

        let (endpoint, credential) = resolve_inference_target(args, &connection).await?;
        let chat_client = new_chat_client(ChatClientConfig {
            endpoint,
            api_version: args.api_version.clone(),
            credential,
        })?;

        let retriever_config = RetrieverConfig {
            retriever_type: args.retriever_type.parse::<RetrieverType>()?,
            url: args.retriever_url.clone(),
            catalog_path: PathBuf::from(&args.catalog_path),
            limit: args.retriever_limit,
        };
        let retriever = new_retriever(&retriever_config).await?;

        info!(
            "Chat model: {}, endpoint: {}, prompt assets: {}",
            model,
            chat_client.endpoint(),
            args.asset_path
        );
        Ok(Self::new(retriever, chat_client, model, PathBuf::from(&args.asset_path)))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs one grounded chat turn.
    ///
    /// `context` is moved through the call and handed back in the envelope,
    /// including anything the retriever recorded into it. Collaborator errors
    /// are returned as-is.
    pub async fn chat_with_products(
        &self,
        messages: Vec<ChatMessage>,
        context: Context
    ) -> Result<ResponseEnvelope, Box<dyn Error + Send + Sync>> {
        let span = tracing::info_span!(
            "chat_with_products",
            model = %self.model,
            messages = messages.len()
        );
        self.grounded_chat(messages, context).instrument(span).await
    }

    async fn grounded_chat(
        &self,
        messages: Vec<ChatMessage>,
        mut context: Context
    ) -> Result<ResponseEnvelope, Box<dyn Error + Send + Sync>> {
        let documents = self.retriever.get_product_documents(&messages, &mut context).await?;

        let prompt = PromptTemplate::load(&self.asset_path, GROUNDED_CHAT_PROMPT).await?;
        let system_messages = prompt.render(&documents, &context)?;

        let mut outgoing = Vec::with_capacity(system_messages.len() + messages.len());
        outgoing.extend(system_messages);
        outgoing.extend(messages);

        let completion = self.chat_client.complete(&self.model, &outgoing, &prompt.parameters).await?;
        let message = completion.into_first_message()?;
        info!("💬 Response: [{}] {}", message.role, message.content);

        Ok(ResponseEnvelope { message, context })
    }
}

/// Inference endpoint and credential for chat completions.
///
/// An explicit endpoint wins. Otherwise the project's default AI Services
/// connection is looked up, and its stored key is used when the connection is
/// key-authenticated and no key or token is set in the environment.
async fn resolve_inference_target(
    args: &Args,
    connection: &ProjectConnection
) -> Result<(Url, Credential), Box<dyn Error + Send + Sync>> {
    if let Some(raw) = args.inference_endpoint.as_deref().filter(|s| !s.trim().is_empty()) {
        let credential = Credential::resolve(COGNITIVE_SERVICES_RESOURCE).await?;
        return Ok((parse_url(raw)?, credential));
    }

    let project = ProjectClient::new(connection, Credential::resolve_token(MANAGEMENT_RESOURCE).await?)?;
    let service = project.default_ai_services_connection().await?;
    let endpoint = service.inference_endpoint()?;

    let credential = match Credential::from_env() {
        Some(credential) => credential,
        None if service.uses_api_key() => Credential::ApiKey(project.connection_key(&service.name).await?),
        None => Credential::resolve(COGNITIVE_SERVICES_RESOURCE).await?,
    };
    Ok((endpoint, credential))
}
