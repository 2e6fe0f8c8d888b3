//! Per-peer sliding-window rate limiter plus timed quarantine (§4.8).

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Per-peer arrival tracking: a 1-second sliding window of timestamps plus
/// a violation counter that escalates to quarantine.
#[derive(Default)]
struct PeerState {
    /// Recent arrival timestamps (seconds), pruned to the trailing window.
    arrivals: VecDeque<i64>,
    violations: u32,
    quarantined_until: Option<i64>,
}

/// Tracks per-peer message rates and quarantine state.
pub struct RateLimiter {
    limit_per_sec: u32,
    violations_before_quarantine: u32,
    quarantine_duration: Duration,
    peers: HashMap<String, PeerState>,
}

impl RateLimiter {
    pub fn new(limit_per_sec: u32, violations_before_quarantine: u32, quarantine_duration: Duration) -> Self {
        Self {
            limit_per_sec,
            violations_before_quarantine,
            quarantine_duration,
            peers: HashMap::new(),
        }
    }

    pub fn is_quarantined(&self, peer: &str, now: i64) -> bool {
        self.peers
            .get(peer)
            .and_then(|p| p.quarantined_until)
            .map(|until| now < until)
            .unwrap_or(false)
    }

    /// Records one arrival from `peer` at `now`; returns `Err` if the peer
    /// is quarantined or the 1-second sliding-window rate is exceeded. The
    /// tenth violation (configurable) quarantines the peer for
    /// `quarantine_duration`.
    pub fn record_and_check(&mut self, peer: &str, now: i64) -> Result<(), RateLimitOutcome> {
        let state = self.peers.entry(peer.to_string()).or_default();

        if let Some(until) = state.quarantined_until {
            if now < until {
                return Err(RateLimitOutcome::Quarantined);
            }
            state.quarantined_until = None;
        }

        while let Some(&oldest) = state.arrivals.front() {
            if now - oldest >= 1 {
                state.arrivals.pop_front();
            } else {
                break;
            }
        }
        state.arrivals.push_back(now);

        if state.arrivals.len() as u32 > self.limit_per_sec {
            state.violations += 1;
            if state.violations >= self.violations_before_quarantine {
                state.quarantined_until = Some(now + self.quarantine_duration.as_secs() as i64);
                return Err(RateLimitOutcome::NewlyQuarantined);
            }
            return Err(RateLimitOutcome::RateLimited);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Quarantined,
    RateLimited,
    NewlyQuarantined,
}
