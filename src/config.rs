//! Application configuration schema
//!
//! Configuration is a plain JSON file plus CLI overrides; there is no
//! persistence in the hot path.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// WebRTC/ICE settings
    pub stream: StreamConfig,
    /// Session lifecycle settings
    pub session: SessionConfig,
    /// Metrics aggregation settings
    pub metrics: MetricsConfig,
    /// Inference backend settings
    pub inference: InferenceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            stream: StreamConfig::default(),
            session: SessionConfig::default(),
            metrics: MetricsConfig::default(),
            inference: InferenceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Listen address
    pub bind_address: String,
    /// HTTP port
    pub http_port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 5000,
        }
    }
}

/// WebRTC/ICE configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// STUN server URLs
    // Empty STUN servers for local connections - host candidates work directly
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![],
            turn_servers: vec![],
        }
    }
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServer {
    /// TURN server URLs (e.g., ["turn:turn.example.com:3478?transport=udp"])
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum concurrent sessions
    pub max_sessions: usize,
    /// Offer/answer negotiation ceiling in milliseconds; sessions that take
    /// longer transition to failed instead of hanging
    pub negotiation_timeout_ms: u64,
    /// Interval for sweeping sessions whose transport reached a terminal state
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 32,
            negotiation_timeout_ms: 10_000,
            cleanup_interval_secs: 60,
        }
    }
}

/// Metrics aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Rolling latency window capacity (samples, FIFO eviction)
    pub window_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_capacity: 120,
        }
    }
}

/// Inference backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// HTTP endpoint of the external inference engine; when unset, server-mode
    /// sessions produce empty detections
    pub endpoint: Option<String>,
    /// Per-request inference timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_ms: 2_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.web.http_port, 5000);
        assert_eq!(config.metrics.window_capacity, 120);
        assert!(config.session.max_sessions > 0);
        assert!(config.inference.endpoint.is_none());
    }

    #[test]
    fn load_merges_partial_file_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"web": {{"http_port": 8080}}, "metrics": {{"window_capacity": 30}}}}"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.web.http_port, 8080);
        assert_eq!(config.metrics.window_capacity, 30);
        // Untouched sections keep defaults
        assert_eq!(config.session.max_sessions, 32);
    }

    #[test]
    fn load_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(AppConfig::load(file.path()).is_err());
    }
}
