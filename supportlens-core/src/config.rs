use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct SupportLensConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Total schema-bootstrap attempts at startup, the first one included.
    #[serde(default = "default_bootstrap_max_attempts")]
    pub bootstrap_max_attempts: usize,
    #[serde(default = "default_bootstrap_delay_ms")]
    pub bootstrap_delay_ms: u64,
}

fn default_bootstrap_max_attempts() -> usize {
    5
}

fn default_bootstrap_delay_ms() -> u64 {
    2000
}

/// Classifier settings from the config file. The API key is deliberately not
/// here: it comes from the `GEMINI_API_KEY` environment variable so it never
/// lands in a checked-in file.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    pub model: String,
    pub timeout_seconds: u64,
    #[serde(default = "default_reply_word_limit")]
    pub reply_word_limit: usize,
}

fn default_reply_word_limit() -> usize {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl SupportLensConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_defaults() {
        let http = HttpConfig::default();
        assert_eq!(http.host, "127.0.0.1");
        assert_eq!(http.port, 8787);
    }

    #[test]
    fn test_database_defaults_fill_missing_retry_fields() {
        let db: DatabaseConfig = serde_json::from_value(serde_json::json!({
            "url": "sqlite://supportlens.db",
            "max_connections": 5
        }))
        .unwrap();
        assert_eq!(db.bootstrap_max_attempts, 5);
        assert_eq!(db.bootstrap_delay_ms, 2000);
    }
}
