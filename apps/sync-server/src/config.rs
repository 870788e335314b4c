//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.
//! The protocol has no persisted state across restarts; this only
//! covers bind address and playback defaults, not playlist contents.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the control server binds to.
    /// Override: `SYNC_BIND_ADDRESS`
    pub bind_address: String,

    /// Port the control server binds to. 0 means OS-assigned.
    /// Override: `SYNC_BIND_PORT`
    pub bind_port: u16,

    /// Address the clock provider binds to.
    /// Override: `SYNC_CLOCK_ADDRESS`
    pub clock_address: String,

    /// Port the clock provider binds to. 0 means OS-assigned.
    /// Override: `SYNC_CLOCK_PORT`
    pub clock_port: u16,

    /// Target pipeline latency in nanoseconds.
    /// Override: `SYNC_LATENCY_NS`
    pub latency_ns: u64,

    /// Grace period between tracks, in nanoseconds.
    /// Override: `SYNC_STREAM_START_DELAY_NS`
    pub stream_start_delay_ns: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            bind_port: 9870,
            clock_address: "0.0.0.0".into(),
            clock_port: 0,
            latency_ns: sync_core::protocol_constants::DEFAULT_LATENCY_NS,
            stream_start_delay_ns: sync_core::protocol_constants::DEFAULT_STREAM_START_DELAY_NS,
        }
    }
}

impl ServerConfig {
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

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SYNC_BIND_ADDRESS") {
            self.bind_address = val;
        }
        if let Ok(val) = std::env::var("SYNC_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }
        if let Ok(val) = std::env::var("SYNC_CLOCK_ADDRESS") {
            self.clock_address = val;
        }
        if let Ok(val) = std::env::var("SYNC_CLOCK_PORT") {
            if let Ok(port) = val.parse() {
                self.clock_port = port;
            }
        }
        if let Ok(val) = std::env::var("SYNC_LATENCY_NS") {
            if let Ok(ns) = val.parse() {
                self.latency_ns = ns;
            }
        }
        if let Ok(val) = std::env::var("SYNC_STREAM_START_DELAY_NS") {
            if let Ok(ns) = val.parse() {
                self.stream_start_delay_ns = ns;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_protocol_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.latency_ns, sync_core::protocol_constants::DEFAULT_LATENCY_NS);
    }
}

/// Path to a YAML playlist file: a list of `{uri, duration_ns}` entries.
/// `duration_ns` may be omitted for unknown-duration tracks.
#[derive(Debug, Deserialize)]
pub struct PlaylistFileEntry {
    pub uri: String,
    #[serde(default)]
    pub duration_ns: Option<u64>,
}

/// Loads a playlist from a YAML file of `PlaylistFileEntry` values.
pub fn load_playlist(path: &PathBuf) -> Result<sync_core::Playlist> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read playlist file: {}", path.display()))?;
    let entries: Vec<PlaylistFileEntry> = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse playlist file: {}", path.display()))?;
    let tracks = entries
        .into_iter()
        .map(|e| match e.duration_ns {
            Some(d) => sync_core::Track::new(e.uri, d),
            None => sync_core::Track::with_unknown_duration(e.uri),
        })
        .collect();
    Ok(sync_core::Playlist::new(tracks))
}
