// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The routing table: 256 k-buckets plus a `node_index` for O(1) lookup.
//!
//! The bucket array and the index map are never exposed separately; every
//! mutation goes through a method on `RoutingTable` that keeps both
//! consistent, per the single invariant-enforcing-type design this crate
//! follows throughout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::kbucket::{InsertResult, KBucket, RoutingNode, K};
use crate::keyspace::{bucket_index, random_id_in_bucket, NodeId, RealmId, GLOBAL_REALM, KEY_SIZE};

const NUM_BUCKETS: usize = KEY_SIZE * 8;

struct Inner {
    buckets: Vec<KBucket>,
    node_index: HashMap<NodeId, usize>,
}

pub struct RoutingTable {
    local_id: NodeId,
    realm_id: RealmId,
    inner: RwLock<Inner>,
}

impl RoutingTable {
    pub fn new(local_id: NodeId) -> Self {
        Self::new_for_realm(local_id, GLOBAL_REALM.to_string())
    }

    /// Constructs a table scoped to a particular realm; a node running in
    /// more than one realm keeps one `RoutingTable` per realm.
    pub fn new_for_realm(local_id: NodeId, realm_id: RealmId) -> Self {
        let mut buckets = Vec::with_capacity(NUM_BUCKETS);
        for _ in 0..NUM_BUCKETS {
            buckets.push(KBucket::new());
        }
        Self {
            local_id,
            realm_id,
            inner: RwLock::new(Inner {
                buckets,
                node_index: HashMap::new(),
            }),
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    pub fn realm_id(&self) -> &str {
        &self.realm_id
    }

    /// No-op for the local node's own id. Otherwise inserts/refreshes the
    /// node in its bucket, keeping `node_index` consistent.
    pub async fn update(&self, node: RoutingNode) {
        if node.id == self.local_id {
            return;
        }
        let idx = bucket_index(self.local_id.as_bytes(), node.id.as_bytes());
        let mut inner = self.inner.write().await;
        let id = node.id;
        match inner.buckets[idx].insert(node) {
            InsertResult::Inserted => {
                inner.node_index.insert(id, idx);
            }
            InsertResult::Cached => {}
        }
    }

    pub async fn remove(&self, id: &NodeId) {
        let mut inner = self.inner.write().await;
        if let Some(idx) = inner.node_index.remove(id) {
            let (_, promoted) = inner.buckets[idx].remove(id);
            if let Some(promoted_id) = promoted {
                inner.node_index.insert(promoted_id, idx);
            }
        }
    }

    pub async fn find(&self, id: &NodeId) -> Option<RoutingNode> {
        let inner = self.inner.read().await;
        let idx = *inner.node_index.get(id)?;
        inner.buckets[idx].get(id).cloned()
    }

    pub async fn contains(&self, id: &NodeId) -> bool {
        let inner = self.inner.read().await;
        inner.node_index.contains_key(id)
    }

    /// Linear scan of every bucket, sorted ascending by XOR distance to
    /// `key`, truncated to `count`.
    pub async fn nearest_peers(&self, key: &NodeId, count: usize) -> Vec<RoutingNode> {
        let inner = self.inner.read().await;
        let mut all: Vec<RoutingNode> = inner
            .buckets
            .iter()
            .flat_map(|b| b.iter().cloned())
            .collect();
        all.sort_by(|a, b| a.id.distance(key).0.cmp(&b.id.distance(key).0));
        all.truncate(count);
        all
    }

    pub async fn buckets_needing_refresh(&self, now: Instant, refresh_interval: Duration) -> Vec<usize> {
        let inner = self.inner.read().await;
        inner
            .buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| match b.last_refresh {
                None => true,
                Some(t) => now.saturating_duration_since(t) > refresh_interval,
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    pub async fn mark_refreshed(&self, idx: usize, at: Instant) {
        let mut inner = self.inner.write().await;
        if let Some(bucket) = inner.buckets.get_mut(idx) {
            bucket.last_refresh = Some(at);
        }
    }

    pub fn random_id_in_bucket(&self, idx: usize) -> NodeId {
        random_id_in_bucket(self.local_id.as_bytes(), idx)
    }

    /// Removes every node whose `last_seen` is older than `node_expire_time`.
    pub async fn cleanup(&self, node_expire_time: Duration) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let mut expired_ids = Vec::new();
        let mut promotions = Vec::new();
        for (idx, bucket) in inner.buckets.iter_mut().enumerate() {
            let (expired, promoted) = bucket.remove_expired(now, node_expire_time);
            expired_ids.extend(expired.into_iter().map(|n| n.id));
            promotions.extend(promoted.into_iter().map(|id| (id, idx)));
        }
        for id in expired_ids {
            inner.node_index.remove(&id);
        }
        for (id, idx) in promotions {
            inner.node_index.insert(id, idx);
        }
    }

    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.node_index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> NodeId {
        NodeId::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn local_id_is_never_inserted() {
        let local = id(0);
        let table = RoutingTable::new(local);
        table.update(RoutingNode::new(local, vec![], String::new())).await;
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn node_index_stays_consistent_with_bucket_membership() {
        let table = RoutingTable::new(id(0));
        for i in 1..10u8 {
            table.update(RoutingNode::new(id(i), vec![], String::new())).await;
        }
        for i in 1..10u8 {
            assert!(table.contains(&id(i)).await);
            assert!(table.find(&id(i)).await.is_some());
        }
        table.remove(&id(5)).await;
        assert!(!table.contains(&id(5)).await);
        assert!(table.find(&id(5)).await.is_none());
    }

    #[tokio::test]
    async fn node_index_tracks_replacement_cache_promotion() {
        let table = RoutingTable::new(id(0));
        let idx = 100;
        let mut ids = Vec::with_capacity(K + 1);
        for _ in 0..(K + 1) {
            let nid = table.random_id_in_bucket(idx);
            ids.push(nid);
            table.update(RoutingNode::new(nid, vec![], String::new())).await;
        }
        // The (K+1)th node overflows into the replacement cache, not the index.
        assert_eq!(table.len().await, K);
        assert!(!table.contains(&ids[K]).await);

        // Removing an active member must promote the cached one and record it
        // in `node_index`, not just in the bucket.
        table.remove(&ids[0]).await;
        assert!(!table.contains(&ids[0]).await);
        assert!(table.contains(&ids[K]).await);
        assert_eq!(table.find(&ids[K]).await.map(|n| n.id), Some(ids[K]));
        assert_eq!(table.len().await, K);
    }

    #[tokio::test]
    async fn realm_id_is_carried_on_construction() {
        let table = RoutingTable::new_for_realm(id(0), "realm-x".to_string());
        assert_eq!(table.realm_id(), "realm-x");
        assert_eq!(RoutingTable::new(id(0)).realm_id(), GLOBAL_REALM);
    }

    #[tokio::test]
    async fn nearest_peers_sorted_by_distance() {
        let table = RoutingTable::new(id(0));
        for i in [200u8, 1, 100] {
            table.update(RoutingNode::new(id(i), vec![], String::new())).await;
        }
        let nearest = table.nearest_peers(&id(0), 3).await;
        assert_eq!(nearest.len(), 3);
        for w in nearest.windows(2) {
            assert!(w[0].id.distance(&id(0)).0 <= w[1].id.distance(&id(0)).0);
        }
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired() {
        let table = RoutingTable::new(id(0));
        table.update(RoutingNode::new(id(1), vec![], String::new())).await;
        table.cleanup(Duration::from_secs(0)).await;
        // last_seen is "now" at insertion, so with a zero expire window it's
        // already expired by the time cleanup runs.
        assert!(!table.contains(&id(1)).await);
    }
}
