pub mod api;

use crate::orchestrator::ChatOrchestrator;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    orchestrator: Arc<ChatOrchestrator>,
}

impl Server {
    pub fn new(addr: String, orchestrator: Arc<ChatOrchestrator>) -> Self {
        Self { addr, orchestrator }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(&self.addr, self.orchestrator.clone()).await
    }
}
