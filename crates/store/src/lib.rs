//! Chat history storage implementations for FaceAgent.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

use faceagent_config::DatabaseConfig;
use faceagent_core::{ChatStore, StoreError};
use std::sync::Arc;
use tracing::warn;

/// Open the store selected by the database configuration.
///
/// A configured URL connects to PostgreSQL; without one, history lives in
/// process memory and projects are claimed by their first caller.
pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn ChatStore>, StoreError> {
    match &config.url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.max_connections, config.statement_cache_capacity).await?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("No database configured, chat history will not survive restarts");
            Ok(Arc::new(InMemoryStore::claim_on_first_use()))
        }
    }
}
