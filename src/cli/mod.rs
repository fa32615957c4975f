use clap::Parser;

use crate::llm::chat::DEFAULT_API_VERSION;
use crate::models::chat::ChatMessage;

pub const DEFAULT_QUERY: &str = "I need a new tent for 4 people, what would you recommend?";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Query to use to search product
    #[arg(long, default_value = DEFAULT_QUERY)]
    pub query: String,

    /// Enable sending telemetry (span timings) to stderr
    #[arg(long)]
    pub enable_telemetry: bool,

    // --- Project Args ---
    /// Project connection string: <host>;<subscription_id>;<resource_group>;<project_name>
    #[arg(long, env = "AIPROJECT_CONNECTION_STRING")]
    pub connection_string: Option<String>,

    /// Model name for chat completion (e.g., gpt-4o-mini)
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Model inference endpoint. Looked up from the project's AI Services connection if not set.
    #[arg(long, env = "AZURE_AI_INFERENCE_ENDPOINT")]
    pub inference_endpoint: Option<String>,

    /// API version sent with chat completion requests.
    #[arg(long, env = "AZURE_AI_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Directory containing prompt templates (grounded_chat.prompty).
    #[arg(long, env = "ASSET_PATH", default_value = "assets")]
    pub asset_path: String,

    // --- Retriever Args ---
    /// Where product documents come from (http, catalog)
    #[arg(long, env = "RETRIEVER_TYPE", default_value = "http")]
    pub retriever_type: String,

    /// Product search service URL, used by the http retriever.
    #[arg(long, env = "PRODUCT_SEARCH_URL")]
    pub retriever_url: Option<String>,

    /// JSON product catalog, used by the catalog retriever.
    #[arg(long, env = "PRODUCT_CATALOG_PATH", default_value = "assets/products.json")]
    pub catalog_path: String,

    /// Maximum number of documents to ground on.
    #[arg(long, env = "RETRIEVER_LIMIT", default_value = "5")]
    pub retriever_limit: usize,

    // --- Server Args ---
    /// Serve the chat endpoint over HTTP instead of answering --query once.
    #[arg(long)]
    pub serve: bool,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,
}

impl Args {
    /// Conversation sent when running once from the command line.
    pub fn initial_messages(&self) -> Vec<ChatMessage> {
        vec![ChatMessage::user(self.query.clone())]
    }
}
