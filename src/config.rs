//! Typed configuration, loaded from a single YAML document with a
//! `tscached` root key.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tscached_engine::EngineConfig;
use tscached_readahead::ReadaheadConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("could not parse config file {path}: {source}")]
    Parse { path: String, source: serde_yaml::Error },
}

#[derive(Debug, Clone, Deserialize)]
struct KairosdbSection {
    host: String,
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct RedisSection {
    host: String,
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct DataSection {
    staleness_threshold: i64,
    expected_resolution: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct ChunkingSection {
    chunk_length: i64,
}

fn default_leader_expiration_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
struct ShadowSection {
    http_header_name: String,
    #[serde(default)]
    referrer_blacklist: Vec<String>,
    #[serde(default = "default_leader_expiration_secs")]
    leader_expiration: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct ExpirySection {
    metricnames: u64,
    tagnames: u64,
    tagvalues: u64,
    metaquery: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct TscachedDocument {
    kairosdb: KairosdbSection,
    redis: RedisSection,
    data: DataSection,
    chunking: ChunkingSection,
    shadow: ShadowSection,
    expiry: ExpirySection,
}

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    tscached: TscachedDocument,
}

/// Per-endpoint read-through TTLs for the metadata passthrough routes.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryConfig {
    pub metricnames: Duration,
    pub tagnames: Duration,
    pub tagvalues: Duration,
    pub metaquery: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub kairosdb_host: String,
    pub kairosdb_port: u16,
    pub redis_url: String,
    pub engine: EngineConfig,
    pub readahead: ReadaheadConfig,
    pub expiry: ExpiryConfig,
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        let parsed: ConfigFile =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })?;
        Ok(Self::from(parsed.tscached))
    }
}

impl From<TscachedDocument> for Config {
    fn from(doc: TscachedDocument) -> Self {
        Self {
            kairosdb_host: doc.kairosdb.host,
            kairosdb_port: doc.kairosdb.port,
            redis_url: format!("redis://{}:{}", doc.redis.host, doc.redis.port),
            engine: EngineConfig {
                staleness_threshold: doc.data.staleness_threshold,
                expected_resolution_ms: doc.data.expected_resolution,
                chunk_length: doc.chunking.chunk_length,
            },
            readahead: ReadaheadConfig {
                http_header_name: doc.shadow.http_header_name,
                referrer_blacklist: doc.shadow.referrer_blacklist,
                leader_expiration: Duration::from_secs(doc.shadow.leader_expiration),
            },
            expiry: ExpiryConfig {
                metricnames: Duration::from_secs(doc.expiry.metricnames),
                tagnames: Duration::from_secs(doc.expiry.tagnames),
                tagvalues: Duration::from_secs(doc.expiry.tagvalues),
                metaquery: Duration::from_secs(doc.expiry.metaquery),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
tscached:
  kairosdb: {host: kairosdb.internal, port: 8080}
  redis: {host: redis.internal, port: 6379}
  data: {staleness_threshold: 30, expected_resolution: 10000}
  chunking: {chunk_length: 1800}
  shadow:
    http_header_name: X-tscached-shadow
    referrer_blacklist: [bot, healthcheck]
    leader_expiration: 120
  expiry: {metricnames: 3600, tagnames: 3600, tagvalues: 3600, metaquery: 600}
"#;

    #[test]
    fn parses_a_complete_document() {
        let parsed: ConfigFile = serde_yaml::from_str(SAMPLE).unwrap();
        let config = Config::from(parsed.tscached);
        assert_eq!(config.kairosdb_host, "kairosdb.internal");
        assert_eq!(config.kairosdb_port, 8080);
        assert_eq!(config.redis_url, "redis://redis.internal:6379");
        assert_eq!(config.engine.staleness_threshold, 30);
        assert_eq!(config.engine.chunk_length, 1_800);
        assert_eq!(config.readahead.referrer_blacklist, vec!["bot".to_string(), "healthcheck".to_string()]);
        assert_eq!(config.readahead.leader_expiration, Duration::from_secs(120));
        assert_eq!(config.expiry.metaquery, Duration::from_secs(600));
    }

    #[test]
    fn shadow_leader_expiration_defaults_when_absent() {
        let without_leader_expiration = SAMPLE.replace("    leader_expiration: 120\n", "");
        let parsed: ConfigFile = serde_yaml::from_str(&without_leader_expiration).unwrap();
        let config = Config::from(parsed.tscached);
        assert_eq!(config.readahead.leader_expiration, Duration::from_secs(120));
    }
}
