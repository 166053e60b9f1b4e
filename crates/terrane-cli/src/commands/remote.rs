use super::{json_pretty, EXIT_SUCCESS};
use std::path::Path;
use terrane_remote::config::default_config_path;
use terrane_remote::RemoteConfig;

pub fn run(config_path: Option<&Path>, json: bool) -> Result<u8, String> {
    let config = match config_path {
        Some(path) => RemoteConfig::load(path),
        None => default_config_path().and_then(|p| RemoteConfig::load(&p)),
    }
    .map_err(|e| e.to_string())?;

    if json {
        let payload = serde_json::json!({
            "hostname": config.hostname,
            "base_url": config.base_url(),
            "organization": config.organization,
            "workspace": config.workspace,
            "token_set": config.token.is_some(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("hostname:      {}", config.hostname);
        println!("organization:  {}", config.organization);
        println!("workspace:     {}", config.workspace);
        println!(
            "token:         {}",
            if config.token.is_some() { "(set)" } else { "(none)" }
        );
    }
    Ok(EXIT_SUCCESS)
}
