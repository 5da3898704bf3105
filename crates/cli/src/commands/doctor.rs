//! `faceagent doctor`: Diagnose configuration and connectivity.

use std::path::Path;

use faceagent_core::Provider;
use faceagent_providers::OpenAiCompatProvider;
use faceagent_store::PostgresStore;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("FaceAgent Doctor");
    println!("================\n");

    let mut issues = 0;

    let path = super::config_path(config_path);
    if path.exists() {
        println!("  ok   Config file at {}", path.display());
    } else {
        println!("  --   No config file at {} (defaults + environment)", path.display());
    }

    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("  FAIL Config invalid: {e}");
            return Ok(());
        }
    };

    for warning in super::config_cmd::warnings(&config) {
        println!("  WARN {warning}");
        issues += 1;
    }

    match OpenAiCompatProvider::from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ok   Model provider reachable at {}", provider.base_url()),
            Ok(false) => {
                println!("  FAIL Model provider at {} answered with an error", provider.base_url());
                issues += 1;
            }
            Err(e) => {
                println!("  FAIL Model provider: {e}");
                issues += 1;
            }
        },
        Err(e) => println!("  --   Model provider skipped: {e}"),
    }

    if let Some(url) = config.database.url.as_deref() {
        match PostgresStore::connect(url, 1, config.database.statement_cache_capacity).await {
            Ok(_) => println!("  ok   Database reachable"),
            Err(e) => {
                println!("  FAIL Database: {e}");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
