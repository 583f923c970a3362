//! Query/series types and cache-key derivation (C2).

use serde::{Deserialize, Serialize};

/// A single aggregator stage in a metric query, e.g.
/// `{"name": "avg", "align_sampling": true, "sampling": {...}}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Aggregator {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align_sampling: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align_start_time: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One metric query as carried in a request's `metrics` array.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricQuery {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub tags: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregators: Vec<Aggregator>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Every aggregator carrying `align_sampling` has that flag removed and
/// `align_start_time: true` inserted, in place. Idempotent: a second call
/// on an already-normalized query is a no-op.
pub fn normalize_aggregators(query: &mut MetricQuery) {
    for agg in &mut query.aggregators {
        if agg.align_sampling.take().is_some() {
            agg.align_start_time = Some(true);
        }
    }
}

/// The fields an `MTS` record's identity is derived from: tags, group-by,
/// aggregators (when present), and the metric name. Field order here is
/// fixed so the resulting JSON — and therefore the digest — is stable.
pub fn mts_key_basis(query: &MetricQuery) -> Result<serde_json::Value, serde_json::Error> {
    let mut map = serde_json::Map::new();
    map.insert("tags".into(), serde_json::Value::Object(query.tags.clone()));
    if let Some(group_by) = &query.group_by {
        map.insert("group_by".into(), group_by.clone());
    }
    if !query.aggregators.is_empty() {
        map.insert("aggregators".into(), serde_json::to_value(&query.aggregators)?);
    }
    map.insert("name".into(), serde_json::Value::String(query.name.clone()));
    Ok(serde_json::Value::Object(map))
}

/// MD5 digest of a value's canonical JSON serialization. `serde_json`'s
/// default `Map` is key-sorted (the `preserve_order` feature is not
/// enabled anywhere in this workspace), so struct field order plus sorted
/// map keys already gives deterministic output — no separate
/// canonicalization pass is needed.
pub fn fingerprint<T: Serialize>(basis: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(basis)?;
    Ok(format!("{:x}", md5::compute(bytes)))
}

/// The digest-keyed cache record types; each maps to a `tscached:<kind>:<digest>` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Kquery,
    Mts,
    Metricnames,
    Tagnames,
    Tagvalues,
    Metaquery,
}

impl CacheKind {
    fn as_str(self) -> &'static str {
        match self {
            CacheKind::Kquery => "kquery",
            CacheKind::Mts => "mts",
            CacheKind::Metricnames => "metricnames",
            CacheKind::Tagnames => "tagnames",
            CacheKind::Tagvalues => "tagvalues",
            CacheKind::Metaquery => "metaquery",
        }
    }
}

pub fn cache_key(kind: CacheKind, digest: &str) -> String {
    format!("tscached:{}:{}", kind.as_str(), digest)
}

/// Fixed singleton/set keys used by the read-ahead worker's leader election.
pub const SHADOW_LIST_KEY: &str = "tscached:shadow_list";
pub const SHADOW_SERVER_KEY: &str = "tscached:shadow_server";
pub const SHADOW_LOCK_KEY: &str = "tscached:shadow_lock";

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_query() -> MetricQuery {
        let mut tags = serde_json::Map::new();
        tags.insert("host".into(), serde_json::json!(["a", "b"]));
        MetricQuery {
            name: "get schwifty".into(),
            tags,
            group_by: None,
            aggregators: vec![],
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn fingerprint_is_stable_across_calls() {
        let query = sample_query();
        let basis = mts_key_basis(&query).unwrap();
        let a = fingerprint(&basis).unwrap();
        let b = fingerprint(&basis).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn fingerprint_changes_with_tag_values() {
        let mut query = sample_query();
        let basis_a = mts_key_basis(&query).unwrap();
        query.tags.insert("host".into(), serde_json::json!(["c"]));
        let basis_b = mts_key_basis(&query).unwrap();
        assert_ne!(fingerprint(&basis_a).unwrap(), fingerprint(&basis_b).unwrap());
    }

    #[test]
    fn cache_key_has_expected_shape() {
        let key = cache_key(CacheKind::Kquery, "deadbeef");
        assert_eq!(key, "tscached:kquery:deadbeef");
    }

    #[test]
    fn normalize_aggregators_replaces_align_sampling() {
        let mut query = sample_query();
        query.aggregators.push(Aggregator {
            name: "avg".into(),
            align_sampling: Some(true),
            align_start_time: None,
            extra: serde_json::Map::new(),
        });
        normalize_aggregators(&mut query);
        assert_eq!(query.aggregators[0].align_sampling, None);
        assert_eq!(query.aggregators[0].align_start_time, Some(true));
    }

    #[test]
    fn normalize_aggregators_is_idempotent() {
        let mut query = sample_query();
        query.aggregators.push(Aggregator {
            name: "avg".into(),
            align_sampling: Some(true),
            align_start_time: None,
            extra: serde_json::Map::new(),
        });
        normalize_aggregators(&mut query);
        normalize_aggregators(&mut query);
        assert_eq!(query.aggregators[0].align_start_time, Some(true));
    }

    #[test]
    fn normalize_aggregators_leaves_others_untouched() {
        let mut query = sample_query();
        query.aggregators.push(Aggregator {
            name: "sum".into(),
            align_sampling: None,
            align_start_time: None,
            extra: serde_json::Map::new(),
        });
        normalize_aggregators(&mut query);
        assert_eq!(query.aggregators[0].align_start_time, None);
    }

    #[test]
    fn mts_key_basis_omits_empty_group_by_and_aggregators() {
        let query = sample_query();
        let basis = mts_key_basis(&query).unwrap();
        let obj = basis.as_object().unwrap();
        assert!(!obj.contains_key("group_by"));
        assert!(!obj.contains_key("aggregators"));
        assert!(obj.contains_key("tags"));
        assert!(obj.contains_key("name"));
    }
}
