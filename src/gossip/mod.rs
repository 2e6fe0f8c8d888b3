//! Anti-abuse gossip layer: envelope validation pipeline, dedup cache, and
//! per-peer rate limiting/quarantine (§4.8).

pub mod cache;
pub mod envelope;
pub mod ratelimit;

use std::sync::Mutex;

pub use cache::DedupCache;
pub use envelope::GossipEnvelope;
pub use ratelimit::{RateLimitOutcome, RateLimiter};

use crate::config::GossipConfig;
use crate::error::GossipError;

/// Owns the dedup cache and rate limiter/quarantine set behind their own
/// mutexes (§5: neither calls into Chain or Mempool while holding its
/// lock).
pub struct GossipLayer {
    config: GossipConfig,
    cache: Mutex<DedupCache>,
    limiter: Mutex<RateLimiter>,
    sync_limiter: Mutex<RateLimiter>,
}

impl GossipLayer {
    pub fn new(config: GossipConfig) -> Self {
        let cache = DedupCache::new(config.cache_size, config.cache_duration);
        let limiter = RateLimiter::new(
            config.rate_limit_per_sec,
            config.rate_limit_violations_before_quarantine,
            config.quarantine_duration,
        );
        let sync_limiter = RateLimiter::new(
            config.sync_rate_limit_per_sec,
            config.rate_limit_violations_before_quarantine,
            config.quarantine_duration,
        );
        Self {
            config,
            cache: Mutex::new(cache),
            limiter: Mutex::new(limiter),
            sync_limiter: Mutex::new(sync_limiter),
        }
    }

    /// Runs the full receive-side validation pipeline from a given peer
    /// (§4.8 steps 1-5): quarantine check, rate limit, structural
    /// validity, and dedup. On acceptance the envelope id is inserted into
    /// the cache as a side effect.
    pub fn validate_inbound(&self, peer: &str, envelope: &GossipEnvelope, now: i64) -> Result<(), GossipError> {
        {
            let limiter = self.limiter.lock().expect("rate limiter lock poisoned");
            if limiter.is_quarantined(peer, now) {
                return Err(GossipError::Quarantined);
            }
        }
        {
            let mut limiter = self.limiter.lock().expect("rate limiter lock poisoned");
            match limiter.record_and_check(peer, now) {
                Ok(()) => {}
                Err(RateLimitOutcome::Quarantined) => return Err(GossipError::Quarantined),
                Err(RateLimitOutcome::NewlyQuarantined) => return Err(GossipError::Quarantined),
                Err(RateLimitOutcome::RateLimited) => return Err(GossipError::RateLimited),
            }
        }

        envelope.validate_structure(now, self.config.max_ttl, self.config.max_message_size)?;

        let mut cache = self.cache.lock().expect("dedup cache lock poisoned");
        if cache.contains(&envelope.id) {
            return Err(GossipError::DuplicateMessage);
        }
        cache.insert(envelope.id.clone(), now);

        Ok(())
    }

    /// Whether `peer` is currently quarantined on the main gossip limiter,
    /// used to exclude quarantined peers from forwarding fanout (§4.8).
    pub fn is_peer_quarantined(&self, peer: &str, now: i64) -> bool {
        self.limiter.lock().expect("rate limiter lock poisoned").is_quarantined(peer, now)
    }

    /// Rate-limit check for unicast sync messages, which bypass the
    /// envelope entirely but are still subject to abuse limits through a
    /// separate, larger bucket (§9 Open Question, resolved: yes).
    pub fn check_sync_rate_limit(&self, peer: &str, now: i64) -> Result<(), GossipError> {
        let mut limiter = self.sync_limiter.lock().expect("sync rate limiter lock poisoned");
        if limiter.is_quarantined(peer, now) {
            return Err(GossipError::Quarantined);
        }
        match limiter.record_and_check(peer, now) {
            Ok(()) => Ok(()),
            Err(_) => Err(GossipError::RateLimited),
        }
    }

    /// Periodic sweep of the dedup cache, run on a dedicated timer default
    /// 1 minute (§4.8, §5).
    pub fn sweep(&self, now: i64) {
        let mut cache = self.cache.lock().expect("dedup cache lock poisoned");
        cache.sweep(now);
    }

    pub fn fanout(&self) -> usize {
        self.config.fanout
    }
    pub fn default_ttl(&self) -> u32 {
        self.config.default_ttl
    }
    pub fn sweep_interval(&self) -> std::time::Duration {
        self.config.sweep_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_envelope_is_forwarded_at_most_once() {
        let layer = GossipLayer::new(GossipConfig::default());
        let env = GossipEnvelope::new("node-a".to_string(), "block".to_string(), vec![1], 10, 1_700_000_000);

        layer.validate_inbound("peer-1", &env, 1_700_000_000).expect("first delivery accepted");
        assert_eq!(
            layer.validate_inbound("peer-2", &env, 1_700_000_000),
            Err(GossipError::DuplicateMessage)
        );
    }

    #[test]
    fn quarantined_peer_is_rejected() {
        let mut cfg = GossipConfig::default();
        cfg.rate_limit_per_sec = 1;
        cfg.rate_limit_violations_before_quarantine = 2;
        let layer = GossipLayer::new(cfg);

        for i in 0..5 {
            let env = GossipEnvelope::new("node-a".to_string(), "tx".to_string(), vec![i as u8], 10, 1_700_000_000);
            let _ = layer.validate_inbound("abuser", &env, 1_700_000_000);
        }
        let env = GossipEnvelope::new("node-a".to_string(), "tx".to_string(), vec![99], 10, 1_700_000_000);
        assert_eq!(
            layer.validate_inbound("abuser", &env, 1_700_000_000),
            Err(GossipError::Quarantined)
        );
    }
}
