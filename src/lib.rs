pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod rag;
pub mod server;
pub mod telemetry;

#[cfg(test)]
mod testing;

use cli::Args;
use log::info;
use models::chat::Context;
use orchestrator::ChatOrchestrator;
use server::Server;
use std::error::Error;
use std::sync::Arc;

/// Messages of `err` and each of its sources, outermost first.
pub fn error_chain(err: &(dyn Error + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    if args.enable_telemetry {
        telemetry::enable_span_export()?;
        info!("Telemetry export enabled");
    }

    info!("--- Core Configuration ---");
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("<unset>"));
    info!("Asset Path: {}", args.asset_path);
    info!("Retriever Type: {}", args.retriever_type);
    info!("Retriever Limit: {}", args.retriever_limit);
    if args.serve {
        info!("Server Address: {}", args.server_addr);
    }
    info!("-------------------------");

    let orchestrator = ChatOrchestrator::from_args(&args).await?;

    if args.serve {
        let server = Server::new(args.server_addr.clone(), Arc::new(orchestrator));
        return server.run().await;
    }

    let envelope = orchestrator.chat_with_products(args.initial_messages(), Context::new()).await?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::project::parse_url;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_chain_walks_every_source() {
        let err = parse_url("not a url").unwrap_err();
        let chain = error_chain(&err);
        assert_eq!(chain.len(), 2);
        assert!(chain[0].starts_with("invalid URL 'not a url'"));
        assert_eq!(chain[1], "relative URL without a base");
    }

    #[test]
    fn boxed_errors_keep_their_chain() {
        let boxed: Box<dyn Error + Send + Sync> = Box::new(parse_url("not a url").unwrap_err());
        assert_eq!(error_chain(boxed.as_ref()).len(), 2);
    }
}
