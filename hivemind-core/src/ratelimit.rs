//! Sliding-window rate limiting and anti-sybil burst detection
//!
//! A process-wide keyed store of ordered timestamp windows guards two
//! policies:
//! - **Burst gate**: per tenant, every ingest records the contribution in a
//!   sliding window; entries older than the window are pruned and a count
//!   above the threshold rejects the contribution.
//! - **Tier quotas**: per-minute contribute/search limits by billing tier,
//!   keyed `"{op}:{tenant}:{agent}"` so buckets never collide across tenants.
//!
//! Inserts are serialized through the lock; windows for idle keys are pruned
//! opportunistically on access.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::types::Tier;

/// Operations subject to tier quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Contribute,
    Search,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::Contribute => "contribute",
            Operation::Search => "search",
        }
    }

    fn tier_limit(self, tier: Tier) -> usize {
        match self {
            Operation::Contribute => tier.contributions_per_minute(),
            Operation::Search => tier.searches_per_minute(),
        }
    }
}

/// One sliding window of event timestamps (with event ids for the burst set)
#[derive(Debug, Default)]
struct Window {
    entries: VecDeque<(String, Instant)>,
}

impl Window {
    fn prune(&mut self, horizon: Instant) {
        while self
            .entries
            .front()
            .is_some_and(|(_, at)| *at < horizon)
        {
            self.entries.pop_front();
        }
    }
}

/// Keyed sliding-window store backing the burst gate and tier quotas
pub struct RateGate {
    windows: Mutex<HashMap<String, Window>>,
    burst_threshold: usize,
    burst_window: Duration,
}

impl RateGate {
    /// Create a gate with the given burst policy
    pub fn new(burst_threshold: usize, burst_window_seconds: u64) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            burst_threshold,
            burst_window: Duration::from_secs(burst_window_seconds),
        }
    }

    /// Record a contribution for the tenant and check the burst policy
    ///
    /// Returns true when the tenant's contribution count within the sliding
    /// window exceeds the threshold (the contribution should be rejected).
    pub fn check_burst(&self, tenant_id: &str, contribution_id: &str) -> bool {
        let key = format!("burst:{tenant_id}:contributions");
        let now = Instant::now();
        let horizon = now.checked_sub(self.burst_window).unwrap_or(now);

        let mut windows = self.windows.lock();
        let window = windows.entry(key).or_default();
        window.entries.push_back((contribution_id.to_string(), now));
        window.prune(horizon);

        let count = window.entries.len();
        let burst = count > self.burst_threshold;
        if burst {
            debug!("burst gate: tenant {tenant_id} at {count} contributions in window");
        }
        burst
    }

    /// Record an operation and check the caller's per-minute tier quota
    ///
    /// Returns true when the quota is exceeded (the request should be
    /// rejected with a quota error).
    pub fn check_quota(
        &self,
        operation: Operation,
        tier: Tier,
        tenant_id: &str,
        agent_id: &str,
    ) -> bool {
        let key = format!("{}:{tenant_id}:{agent_id}", operation.as_str());
        let now = Instant::now();
        let horizon = now.checked_sub(Duration::from_secs(60)).unwrap_or(now);
        let limit = operation.tier_limit(tier);

        let mut windows = self.windows.lock();
        let window = windows.entry(key).or_default();
        window.prune(horizon);

        if window.entries.len() >= limit {
            debug!(
                "tier quota: {}:{tenant_id}:{agent_id} exceeded {limit}/min ({:?})",
                operation.as_str(),
                tier
            );
            return true;
        }
        window.entries.push_back((String::new(), now));
        false
    }

    /// Drop windows that have gone idle past the horizon
    pub fn cleanup(&self) {
        let now = Instant::now();
        let horizon = now
            .checked_sub(self.burst_window.max(Duration::from_secs(60)))
            .unwrap_or(now);
        let mut windows = self.windows.lock();
        windows.retain(|_, window| {
            window.prune(horizon);
            !window.entries.is_empty()
        });
    }
}
