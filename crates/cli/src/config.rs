//! CLI configuration utilities

use agentic_core::ClientConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Load client configuration from a file, or from defaults and the environment
pub fn load_client_config(path: Option<&Path>, base_url: Option<&str>) -> Result<ClientConfig> {
    let mut config = match path {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ClientConfig::from_env().context("loading config from environment")?,
    };

    if let Some(base_url) = base_url {
        config.api.base_url = base_url.to_string();
        config.validate()?;
    }
    Ok(config)
}

/// Generate a default configuration file
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    ClientConfig::default().save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentic.json");

        generate_default_config(&path).unwrap();
        let config = load_client_config(Some(&path), None).unwrap();

        assert_eq!(config.session.login_route, "/login");
    }

    #[test]
    fn test_base_url_override_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentic.json");
        generate_default_config(&path).unwrap();

        let config = load_client_config(Some(&path), Some("https://chat.example.com")).unwrap();
        assert_eq!(config.api.base_url, "https://chat.example.com");

        assert!(load_client_config(Some(&path), Some("not a url")).is_err());
    }
}
