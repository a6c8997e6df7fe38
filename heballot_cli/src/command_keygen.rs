use crate::config::Config;
use anyhow::Result;
use serde_json::json;

pub fn command_keygen(_matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let keys = config.key_store()?;
    let pair = keys.ensure_keys()?;

    crate::print_json(&json!({
        "keyDir": config.key_dir.display().to_string(),
        "parameters": keys.params().fingerprint(),
        "publicKeyBytes": pair.public_bytes().len(),
    }))
}
