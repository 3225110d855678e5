// =============================================================================
// Configuration — source descriptors and general daemon settings
// =============================================================================
//
// Parsed once at startup from a JSON file. Every field carries a sensible
// default so an older config missing new fields still loads. Matches the
// general shape of the teacher's `RuntimeConfig::load`/`save` (atomic
// tmp+rename is not needed here since the daemon never rewrites its own
// config), generalized from one struct to the source-descriptor arrays this
// spec requires (`original_source/backend/src/config.c` is the grounding
// source for the field names and per-source option shapes).
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::Category;

fn default_refresh_interval() -> u64 {
    30
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_reconnect_interval() -> u64 {
    5
}

fn default_db_path() -> String {
    "marketcrebirth.db".to_string()
}

fn default_http_bind() -> String {
    "0.0.0.0:8420".to_string()
}

fn default_unix_socket_path() -> String {
    "/tmp/marketcrebirth.sock".to_string()
}

/// Declarative field-mapping descriptor consumed by the REST mapping engine (§4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub data_path: String,
    #[serde(default)]
    pub field_symbol: String,
    #[serde(default)]
    pub field_price: String,
    #[serde(default)]
    pub field_change: String,
    #[serde(default)]
    pub field_volume: String,
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub field_prev_close: String,
    #[serde(default)]
    pub symbol_filter: Vec<String>,
}

/// One REST (or calendar, when `category == FinancialNews`) source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestSourceConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub category: Category,
    #[serde(default)]
    pub api_key_header: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub params: String,
    #[serde(default)]
    pub post_body: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_sec: u64,
    #[serde(default)]
    pub mapping: FieldMapping,
}

impl RestSourceConfig {
    pub fn url(&self) -> String {
        if self.params.is_empty() {
            format!("{}{}", self.base_url, self.endpoint)
        } else {
            format!("{}{}?{}", self.base_url, self.endpoint, self.params)
        }
    }
}

/// One RSS/Atom source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssSourceConfig {
    pub name: String,
    pub url: String,
    pub category: Category,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_sec: u64,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    /// Source tier, used to derive the base score for its NewsItems (1=high, 3=low).
    #[serde(default = "default_tier")]
    pub tier: u8,
}

fn default_tier() -> u8 {
    3
}

impl RssSourceConfig {
    /// Base priority score assigned at ingest, derived from tier.
    pub fn base_score(&self) -> f64 {
        match self.tier {
            1 => 100.0,
            2 => 60.0,
            _ => 30.0,
        }
    }
}

/// One streaming (websocket) source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSourceConfig {
    pub name: String,
    pub url: String,
    pub category: Category,
    #[serde(default)]
    pub subscribe_message: Option<String>,
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_sec: u64,
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
    #[serde(default = "default_unix_socket_path")]
    pub unix_socket_path: String,
    #[serde(default)]
    pub rest_sources: Vec<RestSourceConfig>,
    #[serde(default)]
    pub rss_sources: Vec<RssSourceConfig>,
    #[serde(default)]
    pub stream_sources: Vec<StreamSourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            http_bind: default_http_bind(),
            unix_socket_path: default_unix_socket_path(),
            rest_sources: Vec::new(),
            rss_sources: Vec::new(),
            stream_sources: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file at `path`, dropping any
    /// malformed source descriptor rather than failing the whole load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        config.drop_malformed_sources();
        Ok(config)
    }

    /// A malformed source descriptor (§7 `configuration` error) is dropped at
    /// startup rather than aborting the whole daemon.
    fn drop_malformed_sources(&mut self) {
        self.rest_sources.retain(|s| match validate_rest(s) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(source = %s.name, error = %e, "dropping malformed rest source");
                false
            }
        });
        self.rss_sources.retain(|s| match validate_rss(s) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(source = %s.name, error = %e, "dropping malformed rss source");
                false
            }
        });
        self.stream_sources.retain(|s| match validate_stream(s) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(source = %s.name, error = %e, "dropping malformed stream source");
                false
            }
        });
    }
}

fn validate_rest(s: &RestSourceConfig) -> Result<(), crate::error::CoreError> {
    if s.name.is_empty() || s.base_url.is_empty() {
        return Err(crate::error::CoreError::Configuration(
            "rest source requires name and base_url".to_string(),
        ));
    }
    Ok(())
}

fn validate_rss(s: &RssSourceConfig) -> Result<(), crate::error::CoreError> {
    if s.name.is_empty() || s.url.is_empty() {
        return Err(crate::error::CoreError::Configuration(
            "rss source requires name and url".to_string(),
        ));
    }
    Ok(())
}

fn validate_stream(s: &StreamSourceConfig) -> Result<(), crate::error::CoreError> {
    if s.name.is_empty() || !(s.url.starts_with("ws://") || s.url.starts_with("wss://")) {
        return Err(crate::error::CoreError::Configuration(
            "stream source requires name and a ws(s):// url".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.db_path, default_db_path());
        assert!(cfg.rest_sources.is_empty());
    }

    #[test]
    fn rest_source_url_with_and_without_params() {
        let mut src = RestSourceConfig {
            name: "x".into(),
            base_url: "https://api.example.com".into(),
            endpoint: "/v1/ticker".into(),
            method: default_method(),
            category: Category::Crypto,
            api_key_header: String::new(),
            api_key: String::new(),
            params: String::new(),
            post_body: String::new(),
            currency: None,
            refresh_interval_sec: 30,
            mapping: FieldMapping::default(),
        };
        assert_eq!(src.url(), "https://api.example.com/v1/ticker");
        src.params = "ids=bitcoin".into();
        assert_eq!(src.url(), "https://api.example.com/v1/ticker?ids=bitcoin");
    }

    #[test]
    fn rss_tier_maps_to_base_score() {
        let mk = |tier| RssSourceConfig {
            name: "n".into(),
            url: "u".into(),
            category: Category::News,
            refresh_interval_sec: 30,
            region: String::new(),
            country: String::new(),
            tier,
        };
        assert_eq!(mk(1).base_score(), 100.0);
        assert_eq!(mk(2).base_score(), 60.0);
        assert_eq!(mk(3).base_score(), 30.0);
    }

    fn mk_rest(name: &str, base_url: &str) -> RestSourceConfig {
        RestSourceConfig {
            name: name.into(),
            base_url: base_url.into(),
            endpoint: String::new(),
            method: default_method(),
            category: Category::Crypto,
            api_key_header: String::new(),
            api_key: String::new(),
            params: String::new(),
            post_body: String::new(),
            currency: None,
            refresh_interval_sec: 30,
            mapping: FieldMapping::default(),
        }
    }

    fn mk_rss(name: &str, url: &str) -> RssSourceConfig {
        RssSourceConfig {
            name: name.into(),
            url: url.into(),
            category: Category::News,
            refresh_interval_sec: 30,
            region: String::new(),
            country: String::new(),
            tier: 3,
        }
    }

    fn mk_stream(name: &str, url: &str) -> StreamSourceConfig {
        StreamSourceConfig {
            name: name.into(),
            url: url.into(),
            category: Category::Crypto,
            subscribe_message: None,
            reconnect_interval_sec: 5,
        }
    }

    #[test]
    fn drop_malformed_sources_removes_incomplete_entries_only() {
        let mut cfg = Config {
            rest_sources: vec![mk_rest("ok", "https://x"), mk_rest("", "")],
            rss_sources: vec![mk_rss("ok", "https://x"), mk_rss("bad", "")],
            stream_sources: vec![
                mk_stream("ok", "wss://x"),
                mk_stream("bad", "https://not-a-websocket"),
            ],
            ..Config::default()
        };
        cfg.drop_malformed_sources();
        assert_eq!(cfg.rest_sources.len(), 1);
        assert_eq!(cfg.rest_sources[0].name, "ok");
        assert_eq!(cfg.rss_sources.len(), 1);
        assert_eq!(cfg.rss_sources[0].name, "ok");
        assert_eq!(cfg.stream_sources.len(), 1);
        assert_eq!(cfg.stream_sources[0].name, "ok");
    }

    #[test]
    fn validate_stream_accepts_ws_and_wss() {
        assert!(validate_stream(&mk_stream("a", "ws://x")).is_ok());
        assert!(validate_stream(&mk_stream("a", "wss://x")).is_ok());
        assert!(validate_stream(&mk_stream("a", "http://x")).is_err());
    }
}
