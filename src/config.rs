use serde::Serialize;

use crate::audio::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use crate::transport::{Endpoint, TransportError, DEFAULT_ENDPOINT};

pub const ENV_ENDPOINT: &str = "MIC_RELAY_ENDPOINT";
pub const ENV_BLOCK_SIZE: &str = "MIC_RELAY_BLOCK_SIZE";
pub const ENV_DEVICE: &str = "MIC_RELAY_DEVICE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Collector URL, ws:// or wss://
    pub endpoint: String,

    /// Samples per block (and per frame), between 1 and `MAX_BLOCK_SIZE`
    pub block_size: usize,

    /// Input device name to prefer. `None` uses the system default.
    /// Matched exactly, then case-insensitively, then as a substring.
    pub device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            device: None,
        }
    }
}

impl CaptureConfig {
    /// Load from the process environment. Invalid values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(endpoint) = value(ENV_ENDPOINT) {
            match Endpoint::parse(&endpoint) {
                Ok(parsed) => config.endpoint = parsed.as_str().to_string(),
                Err(e) => log::warn!(
                    "Config: ignoring {}={:?}: {} (using {})",
                    ENV_ENDPOINT,
                    endpoint,
                    e,
                    config.endpoint
                ),
            }
        }

        if let Some(raw) = value(ENV_BLOCK_SIZE) {
            match raw.parse::<usize>() {
                Ok(n) if (1..=MAX_BLOCK_SIZE).contains(&n) => config.block_size = n,
                _ => log::warn!(
                    "Config: ignoring {}={:?}, expected 1 to {} (using {})",
                    ENV_BLOCK_SIZE,
                    raw,
                    MAX_BLOCK_SIZE,
                    config.block_size
                ),
            }
        }

        config.device = value(ENV_DEVICE);
        config
    }

    pub fn endpoint(&self) -> Result<Endpoint, TransportError> {
        Endpoint::parse(&self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = CaptureConfig::from_lookup(lookup(&[]));
        assert_eq!(config, CaptureConfig::default());
        assert_eq!(config.endpoint, "ws://localhost:8765");
        assert_eq!(config.block_size, 1024);
        assert!(config.device.is_none());
    }

    #[test]
    fn test_reads_all_values() {
        let config = CaptureConfig::from_lookup(lookup(&[
            (ENV_ENDPOINT, " wss://collector.example:9000/audio "),
            (ENV_BLOCK_SIZE, "512"),
            (ENV_DEVICE, "USB Microphone"),
        ]));
        assert_eq!(config.endpoint, "wss://collector.example:9000/audio");
        assert_eq!(config.block_size, 512);
        assert_eq!(config.device.as_deref(), Some("USB Microphone"));
        assert!(config.endpoint().unwrap().is_secure());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = CaptureConfig::from_lookup(lookup(&[
            (ENV_ENDPOINT, "http://not-a-websocket"),
            (ENV_BLOCK_SIZE, "0"),
            (ENV_DEVICE, "   "),
        ]));
        assert_eq!(config, CaptureConfig::default());

        let config = CaptureConfig::from_lookup(lookup(&[(ENV_BLOCK_SIZE, "lots")]));
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn test_oversized_block_size_falls_back() {
        let config = CaptureConfig::from_lookup(lookup(&[(ENV_BLOCK_SIZE, "2000000000")]));
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);

        let config = CaptureConfig::from_lookup(lookup(&[(ENV_BLOCK_SIZE, "65536")]));
        assert_eq!(config.block_size, MAX_BLOCK_SIZE);

        let config = CaptureConfig::from_lookup(lookup(&[(ENV_BLOCK_SIZE, "65537")]));
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn test_serializes_for_startup_log() {
        let json = serde_json::to_value(CaptureConfig::default()).unwrap();
        assert_eq!(json["endpoint"], "ws://localhost:8765");
        assert_eq!(json["blockSize"], 1024);
        assert!(json["device"].is_null());
    }
}
