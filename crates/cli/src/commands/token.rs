//! `faceagent token`: Mint a development bearer token.

use std::path::Path;

use faceagent_gateway::JwtVerifier;

pub fn run(config_path: Option<&Path>, subject: &str, ttl_secs: i64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if ttl_secs <= 0 {
        return Err("--ttl must be positive".into());
    }
    let config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let verifier = JwtVerifier::from_config(&config.auth)?;
    let token = verifier
        .sign(&verifier.claims_for(subject, ttl_secs))
        .map_err(|e| format!("Failed to sign token: {e:?}"))?;
    println!("{token}");
    Ok(())
}
