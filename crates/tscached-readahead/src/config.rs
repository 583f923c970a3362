//! Read-ahead worker configuration — the `shadow` section of the
//! top-level config document.

use std::time::Duration;

fn default_leader_expiration() -> Duration {
    Duration::from_secs(120)
}

#[derive(Debug, Clone)]
pub struct ReadaheadConfig {
    /// Request header that, when present (any truthy value), opts a query
    /// into read-ahead tracking regardless of referrer.
    pub http_header_name: String,
    /// Referrers containing any of these substrings are never tracked.
    pub referrer_blacklist: Vec<String>,
    /// TTL on the leader-election lock.
    pub leader_expiration: Duration,
}

impl Default for ReadaheadConfig {
    fn default() -> Self {
        Self {
            http_header_name: "X-tscached-shadow".into(),
            referrer_blacklist: Vec::new(),
            leader_expiration: default_leader_expiration(),
        }
    }
}
