//! Exercises `Config::load` against a written-to-disk YAML document,
//! matching the external config surface described in the spec.

use std::io::Write;
use tscached::config::Config;

const SAMPLE: &str = r#"
tscached:
  kairosdb: {host: kairosdb.internal, port: 8080}
  redis: {host: redis.internal, port: 6379}
  data: {staleness_threshold: 30, expected_resolution: 10000}
  chunking: {chunk_length: 1800}
  shadow:
    http_header_name: X-tscached-shadow
    referrer_blacklist: [bot]
    leader_expiration: 120
  expiry: {metricnames: 3600, tagnames: 3600, tagvalues: 3600, metaquery: 600}
"#;

#[test]
fn loads_a_config_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.kairosdb_host, "kairosdb.internal");
    assert_eq!(config.redis_url, "redis://redis.internal:6379");
    assert_eq!(config.engine.chunk_length, 1_800);
}

#[test]
fn missing_file_is_a_config_error_not_a_panic() {
    let err = Config::load(std::path::Path::new("/nonexistent/tscached.yaml")).unwrap_err();
    assert!(matches!(err, tscached::config::ConfigError::Io { .. }));
}
