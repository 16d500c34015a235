// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Per-sender rate limiting for the two inbound actions the specification
//! names: signed peer-record STORE and ADD_PROVIDER.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorRateLimiter};

use crate::keyspace::NodeId;

struct Entry {
    limiter: DefaultDirectRateLimiter,
    last_used: Instant,
}

/// One GCRA limiter per sender per action, approximating the sliding
/// 60-second window counters the specification describes.
pub struct SenderRateLimiter {
    quota: Quota,
    limiters: RwLock<HashMap<NodeId, Entry>>,
}

impl SenderRateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        let n = NonZeroU32::new(limit).expect("rate limit must be > 0");
        Self {
            quota: Quota::per_minute(n),
            limiters: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `true` if `sender` is within quota for this call (and
    /// consumes one unit of quota); `false` if the sender has exceeded it.
    pub fn check(&self, sender: &NodeId) -> bool {
        let now = Instant::now();
        let mut limiters = self.limiters.write().expect("rate limiter lock poisoned");
        let entry = limiters.entry(*sender).or_insert_with(|| Entry {
            limiter: GovernorRateLimiter::direct(self.quota),
            last_used: now,
        });
        entry.last_used = now;
        entry.limiter.check().is_ok()
    }

    pub fn tracked_senders(&self) -> usize {
        self.limiters.read().expect("rate limiter lock poisoned").len()
    }

    /// Drops per-sender state untouched for longer than `idle_after`.
    pub fn purge_idle(&self, idle_after: Duration) {
        let now = Instant::now();
        let mut limiters = self.limiters.write().expect("rate limiter lock poisoned");
        limiters.retain(|_, entry| now.saturating_duration_since(entry.last_used) <= idle_after);
    }
}

/// Bundles the two named quotas the inbound handler enforces.
pub struct RateLimiters {
    pub peer_record_store: SenderRateLimiter,
    pub add_provider: SenderRateLimiter,
}

impl RateLimiters {
    pub fn new(store_per_min: u32, add_provider_per_min: u32) -> Self {
        Self {
            peer_record_store: SenderRateLimiter::per_minute(store_per_min),
            add_provider: SenderRateLimiter::per_minute(add_provider_per_min),
        }
    }

    pub fn purge_idle(&self, idle_after: Duration) {
        self.peer_record_store.purge_idle(idle_after);
        self.add_provider.purge_idle(idle_after);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(byte: u8) -> NodeId {
        NodeId::from_bytes([byte; 32])
    }

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = SenderRateLimiter::per_minute(10);
        let s = sender(1);
        for _ in 0..10 {
            assert!(limiter.check(&s));
        }
        assert!(!limiter.check(&s));
    }

    #[test]
    fn tracks_senders_independently() {
        let limiter = SenderRateLimiter::per_minute(1);
        assert!(limiter.check(&sender(1)));
        assert!(!limiter.check(&sender(1)));
        assert!(limiter.check(&sender(2)));
    }

    #[test]
    fn purge_idle_drops_untouched_entries() {
        let limiter = SenderRateLimiter::per_minute(10);
        limiter.check(&sender(1));
        assert_eq!(limiter.tracked_senders(), 1);
        limiter.purge_idle(Duration::from_secs(0));
        assert_eq!(limiter.tracked_senders(), 0);
    }
}
