use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::annotate::{DrawConfig, LabelMap};
use crate::frame::ChannelOrder;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Development mode: plain HTTP, no login, relaxed validation
    pub dev_mode: bool,
    /// Default log level when neither RUST_LOG nor the CLI sets one
    pub log_level: String,
    /// TrueType/OpenType font replacing the builtin DejaVu Sans
    pub font_path: Option<PathBuf>,
    /// Web server settings
    pub web: WebConfig,
    /// Login credentials and sessions
    pub auth: AuthConfig,
    /// Login attempt limiting
    pub limiter: LimiterConfig,
    /// Queueing and MJPEG output
    pub stream: StreamConfig,
    /// Annotation drawing
    pub draw: DrawConfig,
    /// Subscribed topics
    pub topics: Vec<TopicConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            log_level: "info".to_string(),
            font_path: None,
            web: WebConfig::default(),
            auth: AuthConfig::default(),
            limiter: LimiterConfig::default(),
            stream: StreamConfig::default(),
            draw: DrawConfig::default(),
            topics: Vec::new(),
        }
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub bind_address: String,
    /// Listen port (HTTPS in production, HTTP in development)
    pub port: u16,
    /// PEM certificate chain
    pub tls_cert_path: Option<PathBuf>,
    /// PEM private key
    pub tls_key_path: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5001,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Login name
    pub username: String,
    /// Plain password, hashed at startup
    pub password: Option<String>,
    /// Argon2 PHC string, used as-is
    pub password_hash: Option<String>,
    /// Session timeout in seconds
    pub session_timeout_secs: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: None,
            password_hash: None,
            session_timeout_secs: 3600 * 24, // 24 hours
        }
    }
}

impl AuthConfig {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
            && (self.password.as_deref().is_some_and(|p| !p.is_empty())
                || self.password_hash.as_deref().is_some_and(|h| !h.is_empty()))
    }
}

/// Login attempt limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Failures that arm the lockout
    pub threshold: u32,
    /// Upper bound of the per-failure delay, in tenths of a second
    pub jitter_max_tenths: u32,
    /// Lockout delay range in whole seconds
    pub lockout_min_secs: u64,
    pub lockout_max_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            jitter_max_tenths: 9,
            lockout_min_secs: 5,
            lockout_max_secs: 10,
        }
    }
}

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames buffered per topic
    pub queue_capacity: usize,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Pause after a chunk that carried no new frame
    pub idle_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            jpeg_quality: 85,
            idle_interval_ms: 50,
        }
    }
}

/// Bus transport mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// TCP socket, `host:port`
    #[default]
    Tcp,
    /// Local socket path
    Ipc,
}

/// Bus connection settings for one topic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    /// `host:port` (an optional `tcp://` prefix is accepted) or socket path
    pub address: String,
}

/// One subscribed topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Topic name, also the URL path of its stream
    pub name: String,
    /// Publishing service, informational
    #[serde(default)]
    pub publisher: Option<String>,
    pub transport: TransportConfig,
    /// Label key to display text
    #[serde(default)]
    pub labels: LabelMap,
    /// Draw detections; otherwise frames pass through untouched
    #[serde(default = "default_true")]
    pub draw_results: bool,
    /// Channel order of raw frames
    #[serde(default)]
    pub channel_order: ChannelOrder,
}

fn default_true() -> bool {
    true
}
