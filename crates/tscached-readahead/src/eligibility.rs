//! Eligibility filter deciding which live-traffic queries get tracked for
//! read-ahead (C7, `should_add_to_readahead`).

use crate::config::ReadaheadConfig;
use crate::error::Result;
use tscached_backend::SHADOW_LIST_KEY;
use tscached_cache::CacheBackend;

/// The opt-in header always wins over the referrer blacklist: a client
/// that explicitly asks to be shadowed is tracked no matter where it came
/// from.
pub fn should_add_to_readahead(config: &ReadaheadConfig, referrer: &str, has_opt_in_header: bool) -> bool {
    if has_opt_in_header {
        return true;
    }
    !referrer.is_empty() && !config.referrer_blacklist.iter().any(|substr| referrer.contains(substr.as_str()))
}

/// Records a query's fingerprint in the read-ahead set if it's eligible.
pub async fn track_for_readahead<C: CacheBackend + ?Sized>(
    cache: &C,
    config: &ReadaheadConfig,
    fingerprint: &str,
    referrer: &str,
    has_opt_in_header: bool,
) -> Result<()> {
    if should_add_to_readahead(config, referrer, has_opt_in_header) {
        cache.sadd(SHADOW_LIST_KEY, fingerprint).await?;
        tracing::debug!(fingerprint, "shadow: tracked for read-ahead");
    } else {
        tracing::debug!(fingerprint, "shadow: not tracking, blacklisted referrer");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tscached_cache::InMemoryBackend;

    fn config() -> ReadaheadConfig {
        ReadaheadConfig { referrer_blacklist: vec!["bot".into(), "internal-healthcheck".into()], ..Default::default() }
    }

    #[test]
    fn opt_in_header_wins_regardless_of_referrer() {
        assert!(should_add_to_readahead(&config(), "https://bot.example.com", true));
    }

    #[test]
    fn blacklisted_referrer_without_header_is_excluded() {
        assert!(!should_add_to_readahead(&config(), "https://some-bot.example.com/page", false));
    }

    #[test]
    fn clean_referrer_without_header_is_included() {
        assert!(should_add_to_readahead(&config(), "https://dashboard.example.com", false));
    }

    #[test]
    fn empty_referrer_without_header_is_excluded() {
        assert!(!should_add_to_readahead(&config(), "", false));
    }

    #[tokio::test]
    async fn tracking_an_eligible_query_adds_it_to_the_shadow_set() {
        let cache = InMemoryBackend::new();
        track_for_readahead(&cache, &config(), "abc123", "https://dashboard.example.com", false).await.unwrap();
        let members = cache.smembers(SHADOW_LIST_KEY).await.unwrap();
        assert_eq!(members, vec!["abc123".to_string()]);
    }

    #[tokio::test]
    async fn tracking_an_ineligible_query_is_a_no_op() {
        let cache = InMemoryBackend::new();
        track_for_readahead(&cache, &config(), "abc123", "https://bot.example.com", false).await.unwrap();
        let members = cache.smembers(SHADOW_LIST_KEY).await.unwrap();
        assert!(members.is_empty());
    }
}
