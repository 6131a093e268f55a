use axum::extract::FromRef;

use crate::ingest::{IngestQueue, IngestStats};
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub queue: IngestQueue,
    pub stats: Arc<IngestStats>,
    pub hash: String,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for IngestQueue {
    fn from_ref(input: &ServerState) -> Self {
        input.queue.clone()
    }
}
