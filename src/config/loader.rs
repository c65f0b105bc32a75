use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::schema::{AppConfig, TopicConfig};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "VISUALIZER_CONFIG";
/// Environment variable forcing development mode on or off
pub const DEV_MODE_ENV: &str = "DEV_MODE";
/// Configuration file used when nothing else is given
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Route names that topics may not shadow
const RESERVED_TOPICS: &[&str] = &["login", "logout", "topics"];

/// Widest accepted status border, in pixels per side
const MAX_BORDER_WIDTH: u32 = 64;

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {name}: {value}")]
    Env { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load the configuration file and apply environment overrides
///
/// The path is taken from `path`, else from `VISUALIZER_CONFIG`, else
/// `config.json` in the working directory. The result is not yet validated,
/// so CLI overrides can still be applied.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
    };

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let mut config: AppConfig =
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
    info!("Loaded configuration from {}", path.display());

    if let Ok(value) = std::env::var(DEV_MODE_ENV) {
        config.dev_mode = parse_bool(&value).ok_or(ConfigError::Env {
            name: DEV_MODE_ENV,
            value,
        })?;
        debug!("{} override: dev_mode = {}", DEV_MODE_ENV, config.dev_mode);
    }

    Ok(config)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Check the configuration for values the service cannot run with
pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::Invalid(msg));

    if config.topics.is_empty() {
        return invalid("no topics configured".to_string());
    }

    let mut seen = HashSet::new();
    for topic in &config.topics {
        validate_topic(topic)?;
        if !seen.insert(topic.name.as_str()) {
            return invalid(format!("duplicate topic '{}'", topic.name));
        }
    }

    if config.stream.queue_capacity == 0 {
        return invalid("stream.queue_capacity must be greater than 0".to_string());
    }
    if !(1..=100).contains(&config.stream.jpeg_quality) {
        return invalid(format!(
            "stream.jpeg_quality must be within 1-100, got {}",
            config.stream.jpeg_quality
        ));
    }

    if config.draw.border_width > MAX_BORDER_WIDTH {
        return invalid(format!(
            "draw.border_width must be at most {}, got {}",
            MAX_BORDER_WIDTH, config.draw.border_width
        ));
    }

    let limiter = &config.limiter;
    if limiter.threshold == 0 {
        return invalid("limiter.threshold must be greater than 0".to_string());
    }
    if limiter.lockout_min_secs > limiter.lockout_max_secs {
        return invalid(format!(
            "limiter.lockout_min_secs ({}) exceeds lockout_max_secs ({})",
            limiter.lockout_min_secs, limiter.lockout_max_secs
        ));
    }

    if !config.dev_mode {
        if !config.auth.has_credentials() {
            return invalid("auth.username and a password are required in production".to_string());
        }
        if config.web.tls_cert_path.is_none() || config.web.tls_key_path.is_none() {
            return invalid(
                "web.tls_cert_path and web.tls_key_path are required in production".to_string(),
            );
        }
    }

    Ok(())
}

fn validate_topic(topic: &TopicConfig) -> Result<(), ConfigError> {
    let name = topic.name.as_str();
    if name.is_empty() {
        return Err(ConfigError::Invalid("topic name must not be empty".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ConfigError::Invalid(format!(
            "topic '{}' may only contain letters, digits, '_', '-' and '.'",
            name
        )));
    }
    if RESERVED_TOPICS.contains(&name) {
        return Err(ConfigError::Invalid(format!(
            "topic '{}' collides with a built-in route",
            name
        )));
    }
    if topic.transport.address.trim().is_empty() {
        return Err(ConfigError::Invalid(format!(
            "topic '{}' has no transport address",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TransportConfig, TransportMode};
    use std::io::Write;

    fn dev_config() -> AppConfig {
        serde_json::from_str(
            r#"{
                "dev_mode": true,
                "topics": [{"name": "camera1", "transport": {"mode": "tcp", "address": "127.0.0.1:65013"}}]
            }"#,
        )
        .unwrap()
    }

    fn prod_config() -> AppConfig {
        let mut config = dev_config();
        config.dev_mode = false;
        config.auth.password = Some("secret".to_string());
        config.web.tls_cert_path = Some("cert.pem".into());
        config.web.tls_key_path = Some("key.pem".into());
        config.topics[0].transport = TransportConfig {
            mode: TransportMode::Tcp,
            address: "10.0.0.2:65013".to_string(),
        };
        config
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = dev_config();
        assert_eq!(config.web.port, 5001);
        assert_eq!(config.stream.queue_capacity, 10);
        assert_eq!(config.limiter.threshold, 3);
        assert!(config.topics[0].draw_results);
        assert!(config.topics[0].labels.is_empty());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"dev_mode": true, "stream": {{"jpeg_quality": 70}},
                "topics": [{{"name": "cam", "labels": {{"1": "SHORT"}},
                             "transport": {{"mode": "ipc", "address": "/tmp/cam.sock"}}}}]}}"#
        )
        .unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.stream.jpeg_quality, 70);
        assert_eq!(config.topics[0].transport.mode, TransportMode::Ipc);
        assert_eq!(config.topics[0].labels.get("1"), Some("SHORT"));
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            load(Some(Path::new("/nonexistent/config.json"))),
            Err(ConfigError::Read { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(load(Some(file.path())), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_production_requirements() {
        // Plain tcp transports need no key material
        assert!(validate(&prod_config()).is_ok());

        let mut no_tls = prod_config();
        no_tls.web.tls_key_path = None;
        assert!(validate(&no_tls).is_err());

        let mut no_password = prod_config();
        no_password.auth.password = None;
        assert!(validate(&no_password).is_err());

        let mut ipc = prod_config();
        ipc.topics[0].transport = TransportConfig {
            mode: TransportMode::Ipc,
            address: "/run/cam.sock".to_string(),
        };
        assert!(validate(&ipc).is_ok());
    }

    #[test]
    fn test_topic_names() {
        for bad in ["", "login", "topics", "a/b", "cam 1"] {
            let mut config = dev_config();
            config.topics[0].name = bad.to_string();
            assert!(validate(&config).is_err(), "accepted '{}'", bad);
        }

        let mut dup = dev_config();
        dup.topics.push(dup.topics[0].clone());
        assert!(validate(&dup).is_err());
    }

    #[test]
    fn test_numeric_ranges() {
        let mut config = dev_config();
        config.stream.queue_capacity = 0;
        assert!(validate(&config).is_err());

        let mut config = dev_config();
        config.stream.jpeg_quality = 0;
        assert!(validate(&config).is_err());

        let mut config = dev_config();
        config.limiter.lockout_min_secs = 20;
        assert!(validate(&config).is_err());

        let mut config = dev_config();
        config.limiter.threshold = 0;
        assert!(validate(&config).is_err());

        let mut config = dev_config();
        config.draw.border_width = u32::MAX / 2 + 1;
        assert!(validate(&config).is_err());
        config.draw.border_width = MAX_BORDER_WIDTH;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
