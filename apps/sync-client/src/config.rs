//! Client configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Client configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Coordinator control-plane address to connect to.
    /// Override: `SYNC_SERVER_ADDRESS`
    pub server_address: String,

    /// Coordinator control-plane port to connect to.
    /// Override: `SYNC_SERVER_PORT`
    pub server_port: u16,

    /// Client identity string. Auto-generated if unset.
    /// Override: `SYNC_CLIENT_ID`
    pub id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".into(),
            server_port: 9870,
            id: None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SYNC_SERVER_ADDRESS") {
            self.server_address = val;
        }
        if let Ok(val) = std::env::var("SYNC_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server_port = port;
            }
        }
        if let Ok(val) = std::env::var("SYNC_CLIENT_ID") {
            self.id = Some(val);
        }
    }
}

/// Generates a client id of the form `sync-client-<rand32hex>` when none
/// was configured.
pub fn resolve_client_id(configured: Option<String>) -> String {
    use rand::Rng;

    configured.unwrap_or_else(|| {
        let suffix: String = (0..8)
            .map(|_| {
                let digit = rand::rng().random_range(0..16u8);
                std::char::from_digit(digit as u32, 16).unwrap()
            })
            .collect();
        format!("{}-{}", sync_core::protocol_constants::CLIENT_ID_PREFIX, suffix)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_client_id_keeps_configured_value() {
        assert_eq!(resolve_client_id(Some("kitchen".into())), "kitchen");
    }

    #[test]
    fn resolve_client_id_generates_prefixed_id_when_unset() {
        let id = resolve_client_id(None);
        assert!(id.starts_with("sync-client-"));
        assert_eq!(id.len(), "sync-client-".len() + 8);
    }
}
