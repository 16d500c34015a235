// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Local value store and provider store. Neither is size-bounded; entries
//! are only removed by explicit action, TTL expiry, or periodic cleanup.
//!
//! Timestamps are `SystemTime` (not `Instant`) because provider entries are
//! reported back to callers as wire-format nanosecond epoch timestamps.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;

use crate::keyspace::NodeId;

fn is_expired(timestamp: SystemTime, ttl: Duration) -> bool {
    SystemTime::now()
        .duration_since(timestamp)
        .map(|elapsed| elapsed > ttl)
        .unwrap_or(false)
}

pub fn unix_nanos(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as i64
}

#[derive(Debug, Clone)]
pub struct StoredValue {
    pub value: Vec<u8>,
    pub provider: NodeId,
    pub timestamp: SystemTime,
    pub ttl: Duration,
}

impl StoredValue {
    pub fn is_expired(&self) -> bool {
        is_expired(self.timestamp, self.ttl)
    }
}

#[derive(Debug, Default)]
pub struct ValueStore {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, hashed_key: String, entry: StoredValue) {
        self.entries.write().await.insert(hashed_key, entry);
    }

    /// Returns the entry only if present and unexpired.
    pub async fn get(&self, hashed_key: &str) -> Option<StoredValue> {
        let entries = self.entries.read().await;
        let entry = entries.get(hashed_key)?;
        if entry.is_expired() {
            None
        } else {
            Some(entry.clone())
        }
    }

    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, v| !v.is_expired());
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[derive(Debug, Clone)]
pub struct ProviderEntry {
    pub id: NodeId,
    pub addrs: Vec<String>,
    pub timestamp: SystemTime,
    pub ttl: Duration,
}

impl ProviderEntry {
    pub fn is_expired(&self) -> bool {
        is_expired(self.timestamp, self.ttl)
    }
}

#[derive(Debug, Default)]
pub struct ProviderStore {
    entries: RwLock<HashMap<String, Vec<ProviderEntry>>>,
}

impl ProviderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts by `id`: an existing entry for the same publisher has its
    /// timestamp (and TTL) refreshed rather than duplicated.
    pub async fn add_provider_local(&self, hashed_key: String, id: NodeId, addrs: Vec<String>, ttl: Duration) {
        let mut entries = self.entries.write().await;
        let bucket = entries.entry(hashed_key).or_default();
        if let Some(existing) = bucket.iter_mut().find(|e| e.id == id) {
            existing.addrs = addrs;
            existing.timestamp = SystemTime::now();
            existing.ttl = ttl;
        } else {
            bucket.push(ProviderEntry {
                id,
                addrs,
                timestamp: SystemTime::now(),
                ttl,
            });
        }
    }

    /// Removes only entries whose `id` matches `publisher`; drops the key
    /// entirely once its bucket becomes empty.
    pub async fn remove_provider_local(&self, hashed_key: &str, publisher: &NodeId) {
        let mut entries = self.entries.write().await;
        if let Some(bucket) = entries.get_mut(hashed_key) {
            bucket.retain(|e| &e.id != publisher);
            if bucket.is_empty() {
                entries.remove(hashed_key);
            }
        }
    }

    pub async fn get_providers_local(&self, hashed_key: &str) -> Vec<ProviderEntry> {
        let entries = self.entries.read().await;
        entries
            .get(hashed_key)
            .map(|bucket| bucket.iter().filter(|e| !e.is_expired()).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, bucket| {
            bucket.retain(|e| !e.is_expired());
            !bucket.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> NodeId {
        NodeId::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn value_get_returns_none_past_ttl() {
        let store = ValueStore::new();
        store
            .put(
                "k".to_string(),
                StoredValue {
                    value: b"v".to_vec(),
                    provider: id(1),
                    timestamp: SystemTime::now() - Duration::from_millis(200),
                    ttl: Duration::from_millis(100),
                },
            )
            .await;
        assert!(store.get("k").await.is_none());
    }

    #[tokio::test]
    async fn cleanup_drops_only_stale_entries() {
        let store = ValueStore::new();
        store
            .put(
                "stale".to_string(),
                StoredValue {
                    value: b"v".to_vec(),
                    provider: id(1),
                    timestamp: SystemTime::now() - Duration::from_secs(2 * 3600),
                    ttl: Duration::from_secs(3600),
                },
            )
            .await;
        store
            .put(
                "fresh".to_string(),
                StoredValue {
                    value: b"v".to_vec(),
                    provider: id(1),
                    timestamp: SystemTime::now(),
                    ttl: Duration::from_secs(24 * 3600),
                },
            )
            .await;
        store.cleanup().await;
        assert!(store.get("stale").await.is_none());
        assert!(store.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn add_then_stop_announce_leaves_no_entries_for_publisher() {
        let providers = ProviderStore::new();
        providers
            .add_provider_local("relay".into(), id(1), vec![], Duration::from_secs(10))
            .await;
        providers.remove_provider_local("relay", &id(1)).await;
        assert!(providers.get_providers_local("relay").await.is_empty());
    }

    #[tokio::test]
    async fn remove_provider_preserves_other_publishers() {
        let providers = ProviderStore::new();
        providers
            .add_provider_local("relay".into(), id(1), vec![], Duration::from_secs(10))
            .await;
        providers
            .add_provider_local("relay".into(), id(2), vec![], Duration::from_secs(10))
            .await;
        providers.remove_provider_local("relay", &id(1)).await;
        let remaining = providers.get_providers_local("relay").await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, id(2));
    }
}
