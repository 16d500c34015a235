// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Public operations: put/get, peer-record publish/lookup/find, provider
//! announce/discover.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::future::join_all;
use tracing::warn;

use crate::collaborators::{AddressBookWriter, Identity, Transport};
use crate::config::DhtConfig;
use crate::error::{DhtError, Result};
use crate::keyspace::{hash_key_string, peer_record_key, NodeId};
use crate::lookup::{self, LookupKind, LookupOutcome};
use crate::peer_record::SignedPeerRecord;
use crate::protocol::PeerInfo;
use crate::routing_table::RoutingTable;
use crate::store::{ProviderEntry, StoredValue, ValueStore};
use crate::store::ProviderStore;

/// Monotonic seqno allocator: a single atomic counter per process,
/// initialized to the current microsecond clock reading and advanced via a
/// compare-and-swap loop so it never goes backwards even across restarts
/// (so long as the system clock is not rolled back).
pub struct SeqnoCounter {
    counter: AtomicU64,
}

impl SeqnoCounter {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(now_micros()),
        }
    }

    pub fn next(&self) -> u64 {
        loop {
            let last = self.counter.load(Ordering::SeqCst);
            let now = now_micros();
            let next = std::cmp::max(last + 1, now);
            if self
                .counter
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }
}

impl Default for SeqnoCounter {
    fn default() -> Self {
        Self::new()
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

pub struct Operations {
    pub table: Arc<RoutingTable>,
    pub values: Arc<ValueStore>,
    pub providers: Arc<ProviderStore>,
    pub transport: Arc<dyn Transport>,
    pub address_book: Arc<dyn AddressBookWriter>,
    pub identity: Arc<dyn Identity>,
    pub config: Arc<DhtConfig>,
    pub seqno: Arc<SeqnoCounter>,
}

impl Operations {
    pub async fn put_value(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.put_value_with_ttl(key, value, self.config.max_record_age).await
    }

    pub async fn put_value_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        if key.is_empty() {
            return Err(DhtError::invalid_argument("empty key"));
        }
        let hashed = hash_key_string(key);
        self.values
            .put(
                hashed,
                StoredValue {
                    value: value.clone(),
                    provider: self.table.local_id(),
                    timestamp: SystemTime::now(),
                    ttl,
                },
            )
            .await;

        let replicas = self.table.nearest_peers(&NodeId::from_bytes(crate::keyspace::hash_key(key)), self.config.replication_factor).await;
        let ttl_secs = ttl.as_secs() as u32;
        let sends = replicas.into_iter().map(|peer| {
            let transport = self.transport.clone();
            let key = key.to_string();
            let value = value.clone();
            async move {
                if let Err(e) = transport.send_store(&peer.id, &peer.addrs, &key, &value, ttl_secs).await {
                    warn!(peer = %peer.id, error = %e, "replication STORE failed");
                }
            }
        });
        join_all(sends).await;
        Ok(())
    }

    pub async fn get_value(&self, key: &str) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(DhtError::invalid_argument("empty key"));
        }
        let hashed = hash_key_string(key);
        if let Some(entry) = self.values.get(&hashed).await {
            return Ok(entry.value);
        }
        if self.table.is_empty().await {
            return Err(DhtError::NoNodes);
        }
        let target = NodeId::from_bytes(crate::keyspace::hash_key(key));
        let outcome = self.run_lookup(target, None, Some(key.to_string()), LookupKind::FindValue).await?;
        match outcome.value {
            Some(value) => {
                self.values
                    .put(
                        hashed,
                        StoredValue {
                            value: value.clone(),
                            provider: self.table.local_id(),
                            timestamp: SystemTime::now(),
                            ttl: self.config.max_record_age,
                        },
                    )
                    .await;
                Ok(value)
            }
            None => Err(DhtError::NotFound(key.to_string())),
        }
    }

    pub async fn publish_peer_record(&self, addrs: Vec<String>) -> Result<()> {
        if addrs.is_empty() {
            return Err(DhtError::invalid_argument("empty addresses"));
        }
        let seqno = self.seqno.next();
        let record = SignedPeerRecord::new(
            self.identity.as_ref(),
            addrs,
            seqno,
            self.config.default_peer_record_ttl,
        )
        .await?;
        let encoded = record.encode_binary()?;
        let key = peer_record_key(&self.table.local_id());
        self.put_value_with_ttl(&key, encoded, self.config.default_peer_record_ttl).await
    }

    pub async fn lookup_peer_record(&self, node_id: &NodeId) -> Result<Vec<String>> {
        let key = peer_record_key(node_id);
        let encoded = self.get_value(&key).await?;
        let record = SignedPeerRecord::decode_binary(&encoded)
            .map_err(|_| DhtError::validation_failed("stored value is not a peer record"))?;
        if record.node_id != *node_id {
            return Err(DhtError::validation_failed("peer record node id mismatch"));
        }
        if record.is_expired() {
            return Err(DhtError::validation_failed("peer record expired"));
        }
        record.verify_self()?;
        Ok(record.addrs)
    }

    pub async fn find_peer(&self, id: &NodeId) -> Result<Vec<String>> {
        if let Ok(addrs) = self.lookup_peer_record(id).await {
            return Ok(addrs);
        }
        if let Some(node) = self.table.find(id).await {
            return Ok(node.addrs);
        }
        if self.table.is_empty().await {
            return Err(DhtError::NoNodes);
        }
        let outcome = self.run_lookup(*id, Some(*id), None, LookupKind::FindNode).await?;
        outcome
            .closest
            .into_iter()
            .find(|p| p.id == *id)
            .map(|p| p.addrs)
            .ok_or_else(|| DhtError::NotFound(id.to_string()))
    }

    pub async fn find_peers(&self, ids: &[NodeId]) -> HashMap<NodeId, Result<Vec<String>>> {
        let futures = ids.iter().map(|id| {
            let id = *id;
            async move { (id, self.find_peer(&id).await) }
        });
        join_all(futures).await.into_iter().collect()
    }

    pub async fn announce_with_ttl(&self, namespace: &str, ttl: Duration) -> Result<()> {
        let key = crate::keyspace::realm_provider_key(self.table.realm_id(), namespace);
        let hashed = hash_key_string(&key);
        let local_id = self.table.local_id();
        let local_addrs = self.transport.local_addrs();
        self.providers
            .add_provider_local(hashed, local_id, local_addrs.clone(), ttl)
            .await;

        let replicas = self
            .table
            .nearest_peers(&NodeId::from_bytes(crate::keyspace::hash_key(&key)), self.config.replication_factor)
            .await;
        let ttl_secs = ttl.as_secs() as u32;
        let sends = replicas.into_iter().map(|peer| {
            let transport = self.transport.clone();
            let key = key.clone();
            async move {
                if let Err(e) = transport.send_add_provider(&peer.id, &peer.addrs, &key, ttl_secs).await {
                    warn!(peer = %peer.id, error = %e, "replication ADD_PROVIDER failed");
                }
            }
        });
        join_all(sends).await;
        Ok(())
    }

    pub async fn add_provider(&self, namespace: &str) -> Result<()> {
        self.announce_with_ttl(namespace, self.config.default_provider_ttl).await
    }

    pub async fn get_providers(&self, namespace: &str) -> Result<Vec<ProviderEntry>> {
        let key = crate::keyspace::realm_provider_key(self.table.realm_id(), namespace);
        let hashed = hash_key_string(&key);
        let mut local = self.providers.get_providers_local(&hashed).await;

        if !self.table.is_empty().await {
            let target = NodeId::from_bytes(crate::keyspace::hash_key(&key));
            let outcome = self.run_lookup(target, None, Some(key), LookupKind::GetProviders).await?;
            for p in &outcome.providers {
                self.address_book.add(&p.id, &p.addrs).await;
            }
            local.extend(outcome.providers.into_iter().map(|p| ProviderEntry {
                id: p.id,
                addrs: p.addrs,
                timestamp: SystemTime::now(),
                ttl: Duration::from_secs(p.ttl_secs as u64),
            }));
        }
        Ok(local)
    }

    pub async fn stop_announce(&self, namespace: &str) -> Result<()> {
        if namespace.is_empty() {
            return Ok(());
        }
        let key = crate::keyspace::realm_provider_key(self.table.realm_id(), namespace);
        let hashed = hash_key_string(&key);
        let local_id = self.table.local_id();
        self.providers.remove_provider_local(&hashed, &local_id).await;

        let replicas = self
            .table
            .nearest_peers(&NodeId::from_bytes(crate::keyspace::hash_key(&key)), self.config.replication_factor)
            .await;
        let transport = self.transport.clone();
        tokio::spawn(async move {
            let sends = replicas.into_iter().map(|peer| {
                let transport = transport.clone();
                let key = key.clone();
                async move {
                    let _ = transport.send_remove_provider(&peer.id, &peer.addrs, &key).await;
                }
            });
            join_all(sends).await;
        });
        Ok(())
    }

    pub async fn discover_peers(&self, namespace: &str) -> Vec<PeerInfo> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        if !namespace.is_empty() {
            if let Ok(providers) = self.get_providers(namespace).await {
                for p in providers {
                    if seen.insert(p.id) {
                        out.push(PeerInfo { id: p.id, addrs: p.addrs });
                    }
                }
            }
        }

        let target = if namespace.is_empty() {
            self.table.local_id()
        } else {
            NodeId::from_bytes(crate::keyspace::hash_key(&crate::keyspace::realm_provider_key(self.table.realm_id(), namespace)))
        };
        let nearest = self.table.nearest_peers(&target, self.config.bucket_size).await;
        for n in nearest {
            if seen.insert(n.id) {
                out.push(PeerInfo { id: n.id, addrs: n.addrs });
            }
        }
        out
    }

    async fn run_lookup(
        &self,
        fanout_key: NodeId,
        target_for_find_node: Option<NodeId>,
        lookup_key: Option<String>,
        kind: LookupKind,
    ) -> Result<LookupOutcome> {
        lookup::run(
            &self.table,
            self.transport.as_ref(),
            self.address_book.as_ref(),
            &self.config,
            fanout_key,
            target_for_find_node,
            lookup_key,
            kind,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seqno_is_monotonically_increasing() {
        let counter = SeqnoCounter::new();
        let mut last = 0u64;
        for _ in 0..100 {
            let next = counter.next();
            assert!(next > last);
            last = next;
        }
    }
}
