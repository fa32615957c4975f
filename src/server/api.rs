use crate::models::chat::{ ChatMessage, Context };
use crate::orchestrator::ChatOrchestrator;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    extract::State,
    response::{ IntoResponse, Response },
    http::StatusCode,
    Json,
};
use serde::{ Deserialize, Serialize };
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

#[derive(Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Context,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
}

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<ChatOrchestrator>,
}

fn router(orchestrator: Arc<ChatOrchestrator>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(AppState { orchestrator })
}

pub async fn start_http_server(
    addr: &str,
    orchestrator: Arc<ChatOrchestrator>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    let listener = tokio::net::TcpListener
        ::bind(addr).await
        .map_err(|e| format!("Failed to bind HTTP server to {}: {}", addr, e))?;
    info!("Serving chat endpoint on: http://{}/chat", addr);

    axum::serve(listener, router(orchestrator).into_make_service()).await?;
    Ok(())
}

async fn chat_handler(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    if req.messages.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "messages must not be empty".into() }),
        ).into_response();
    }

    match state.orchestrator.chat_with_products(req.messages, req.context).await {
        Ok(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        Err(e) => {
            error!("chat_with_products failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() })).into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        model: state.orchestrator.model().to_string(),
    })
}
