//! `faceagent migrate`: Create the chat history schema.

use std::path::Path;

use faceagent_store::PostgresStore;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let Some(url) = config.database.url.as_deref() else {
        return Err("No database configured (set DB_URI or database.url)".into());
    };

    println!("Applying chat history schema...");
    let store = PostgresStore::connect(url, 1, config.database.statement_cache_capacity).await?;
    store.migrate().await?;
    println!("   Done.");

    Ok(())
}
