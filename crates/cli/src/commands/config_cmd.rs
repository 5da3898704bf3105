//! `faceagent config`: Configuration management commands.

use std::path::Path;

use faceagent_config::AppConfig;

type CmdResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub fn init(config_path: Option<&Path>) -> CmdResult {
    let path = super::config_path(config_path);
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", path.display());
    println!("   Secrets are read from the environment: OPENAI_API_KEY, SUPABASE_JWT_SECRET, DB_URI");
    Ok(())
}

pub fn show(config_path: Option<&Path>) -> CmdResult {
    let config = super::load_config(config_path)?;
    println!("{config:#?}");
    Ok(())
}

/// Problems that do not stop the config from loading but will bite at runtime.
pub fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Err(e) = config.ensure_servable() {
        warnings.push(e.to_string());
    }
    if config.webhook.url.is_none() {
        warnings.push("No generation webhook (set N8N_WEBHOOK_URL); generate calls will fail".into());
    }
    if config.database.url.is_none() {
        warnings.push("No database (set DB_URI); history is kept in memory only".into());
    }
    if config.gateway.cors_origins.is_empty() {
        warnings.push("No CORS origins; browsers will be refused".into());
    }

    warnings
}

pub fn validate(config_path: Option<&Path>) -> CmdResult {
    println!("Validating configuration...");

    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   Config invalid: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   No warnings");
    } else {
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    Ok(())
}
