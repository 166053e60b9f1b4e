use crate::RemoteError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOSTNAME: &str = "app.terraform.io";

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_owned()
}

/// Which remote workspace holds the state, and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    pub organization: String,
    pub workspace: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl RemoteConfig {
    pub fn new(organization: &str, workspace: &str) -> Self {
        Self {
            hostname: default_hostname(),
            organization: organization.to_owned(),
            workspace: workspace.to_owned(),
            token: None,
        }
    }

    #[must_use]
    pub fn with_hostname(mut self, hostname: &str) -> Self {
        hostname
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .clone_into(&mut self.hostname);
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_owned());
        self
    }

    pub fn base_url(&self) -> String {
        format!("https://{}", self.hostname)
    }

    /// Load config from `~/.config/terrane/remote.json`.
    pub fn load_default() -> Result<Self, RemoteError> {
        let path = default_config_path()?;
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, RemoteError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RemoteError::Config(format!("invalid remote config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), RemoteError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RemoteError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), RemoteError> {
        if self.hostname.is_empty() {
            return Err(RemoteError::Config("hostname must not be empty".to_owned()));
        }
        if self.organization.is_empty() {
            return Err(RemoteError::Config(
                "organization must not be empty".to_owned(),
            ));
        }
        if self.workspace.is_empty() {
            return Err(RemoteError::Config("workspace must not be empty".to_owned()));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, RemoteError> {
    let home = std::env::var("HOME").map_err(|_| RemoteError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/terrane/remote.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/remote.json");

        let config = RemoteConfig::new("hashicorp", "prod")
            .with_hostname("https://tfe.example.com/")
            .with_token("secret123");
        config.save(&path).unwrap();

        let loaded = RemoteConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.hostname, "tfe.example.com");
        assert_eq!(loaded.base_url(), "https://tfe.example.com");
        assert_eq!(loaded.token.as_deref(), Some("secret123"));
    }

    #[test]
    fn hostname_defaults_when_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.json");
        std::fs::write(&path, r#"{"organization": "o", "workspace": "w"}"#).unwrap();
        let loaded = RemoteConfig::load(&path).unwrap();
        assert_eq!(loaded.hostname, DEFAULT_HOSTNAME);
        assert!(loaded.token.is_none());
    }

    #[test]
    fn empty_workspace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.json");
        std::fs::write(&path, r#"{"organization": "o", "workspace": ""}"#).unwrap();
        let err = RemoteConfig::load(&path).unwrap_err();
        assert!(matches!(err, RemoteError::Config(_)));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            RemoteConfig::load(&path).unwrap_err(),
            RemoteError::Config(_)
        ));
    }
}
