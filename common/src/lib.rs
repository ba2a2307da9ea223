/*!
common/src/lib.rs

Shared configuration types and helpers for prefnews.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a TOML config file
- A default-plus-override merge so a shipped config.default.toml can be
  customized locally without copying every key
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// HTTP server bind configuration, merged into Rocket's figment at launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Channel-level feed settings and the item selection knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    /// Hard cap on rendered entries.
    pub max_items: Option<usize>,
    /// Floor under which the recency window is abandoned.
    pub min_items: Option<usize>,
    /// Trailing window, in days, preferred for published items.
    pub recency_days: Option<i64>,
}

/// Upstream portal endpoints. Listing pages may be given relative to
/// `base_url`; structure ids are expanded into headless-delivery endpoints,
/// while `generic_endpoints` are used verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub base_url: String,
    #[serde(default)]
    pub listing_pages: Vec<String>,
    #[serde(default)]
    pub structure_ids: Vec<i64>,
    pub site_id: i64,
    pub page_size: Option<u32>,
    #[serde(default)]
    pub generic_endpoints: Vec<String>,
    /// Placeholder image used whenever no source-provided image resolves.
    pub default_image: String,
}

/// Include/exclude keyword lists, matched case-insensitively against
/// title + content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub include_keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
}

/// Outbound HTTP behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub user_agent: Option<String>,
}

/// Rendered-document cache behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: Option<i64>,
    /// Last-known-good document path; unset disables the disk fallback.
    pub disk_path: Option<String>,
}

/// Top-level application configuration (deserialized from config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Option<ServerConfig>,
    pub feed: Option<FeedSettings>,
    pub sources: SourcesConfig,
    pub filters: Option<FilterConfig>,
    pub fetch: Option<FetchConfig>,
    pub cache: Option<CacheConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read default config: {}", path.display()))?;
                let val: toml::Value =
                    toml::from_str(&data).context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read override config: {}", path.display()))?;
                let val: toml::Value =
                    toml::from_str(&data).context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    // Scalar accessors below centralize the defaults so call sites do not
    // repeat the Option chains for every knob.

    pub fn feed_title(&self) -> String {
        self.feed
            .as_ref()
            .and_then(|f| f.title.clone())
            .unwrap_or_else(|| "Notícias de Itaquera".to_string())
    }

    pub fn feed_description(&self) -> String {
        self.feed
            .as_ref()
            .and_then(|f| f.description.clone())
            .unwrap_or_else(|| "Feed confiável com as últimas notícias da Prefeitura.".to_string())
    }

    pub fn feed_language(&self) -> String {
        self.feed
            .as_ref()
            .and_then(|f| f.language.clone())
            .unwrap_or_else(|| "pt-br".to_string())
    }

    pub fn max_items(&self) -> usize {
        self.feed.as_ref().and_then(|f| f.max_items).unwrap_or(10)
    }

    pub fn min_items(&self) -> usize {
        self.feed.as_ref().and_then(|f| f.min_items).unwrap_or(10)
    }

    pub fn recency_days(&self) -> i64 {
        self.feed.as_ref().and_then(|f| f.recency_days).unwrap_or(180)
    }

    pub fn page_size(&self) -> u32 {
        self.sources.page_size.unwrap_or(100)
    }

    pub fn include_keywords(&self) -> Vec<String> {
        self.filters
            .as_ref()
            .map(|f| f.include_keywords.clone())
            .unwrap_or_default()
    }

    pub fn exclude_keywords(&self) -> Vec<String> {
        self.filters
            .as_ref()
            .map(|f| f.exclude_keywords.clone())
            .unwrap_or_default()
    }

    pub fn fetch_timeout_seconds(&self) -> u64 {
        self.fetch
            .as_ref()
            .and_then(|f| f.timeout_seconds)
            .unwrap_or(12)
    }

    pub fn max_retries(&self) -> u32 {
        self.fetch.as_ref().and_then(|f| f.max_retries).unwrap_or(2)
    }

    pub fn retry_backoff_ms(&self) -> u64 {
        self.fetch
            .as_ref()
            .and_then(|f| f.retry_backoff_ms)
            .unwrap_or(600)
    }

    pub fn user_agent(&self) -> String {
        self.fetch
            .as_ref()
            .and_then(|f| f.user_agent.clone())
            .unwrap_or_else(|| {
                "Mozilla/5.0 (RSS Generator; +https://rss-sp.onrender.com)".to_string()
            })
    }

    pub fn cache_ttl_seconds(&self) -> i64 {
        self.cache.as_ref().and_then(|c| c.ttl_seconds).unwrap_or(600)
    }

    pub fn cache_disk_path(&self) -> Option<String> {
        self.cache.as_ref().and_then(|c| c.disk_path.clone())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}
