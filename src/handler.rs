// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Inbound request processing: sender binding, rate limiting, address and
//! peer-record validation, then dispatch to the local stores and table.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::addr::validate_address;
use crate::config::DhtConfig;
use crate::kbucket::RoutingNode;
use crate::keyspace::{hash_key_string, NodeId, SYS_PEER_PREFIX};
use crate::peer_record::SignedPeerRecord;
use crate::protocol::{PeerInfo, ProviderInfo, Request, RequestPayload, Response, ResponsePayload};
use crate::rate_limit::RateLimiters;
use crate::routing_table::RoutingTable;
use crate::store::{unix_nanos, ProviderStore, StoredValue, ValueStore};

fn clamp_secs(requested: u32, max: Duration, default: Duration) -> u32 {
    if requested == 0 {
        default.as_secs() as u32
    } else {
        (requested as u64).min(max.as_secs()) as u32
    }
}

pub struct InboundHandler {
    table: Arc<RoutingTable>,
    values: Arc<ValueStore>,
    providers: Arc<ProviderStore>,
    rate_limiters: Arc<RateLimiters>,
    config: Arc<DhtConfig>,
}

impl InboundHandler {
    pub fn new(
        table: Arc<RoutingTable>,
        values: Arc<ValueStore>,
        providers: Arc<ProviderStore>,
        rate_limiters: Arc<RateLimiters>,
        config: Arc<DhtConfig>,
    ) -> Self {
        Self {
            table,
            values,
            providers,
            rate_limiters,
            config,
        }
    }

    /// Processes one inbound request. `trusted_remote_id` is the identity
    /// authenticated by the underlying connection, independent of whatever
    /// the request itself declares as `sender`.
    pub async fn handle(&self, request: Request, trusted_remote_id: NodeId) -> Response {
        let request_id = request.request_id;
        let declared_sender = *request.payload.sender();

        let bound_payload = if declared_sender == NodeId::from_bytes([0u8; 32]) {
            request.payload.with_sender(trusted_remote_id)
        } else if declared_sender != trusted_remote_id {
            warn!(
                declared = %declared_sender,
                authenticated = %trusted_remote_id,
                "sender identity mismatch on inbound request"
            );
            return Response {
                request_id,
                payload: self.mismatch_response(&request.payload),
            };
        } else {
            request.payload
        };

        let sender = *bound_payload.sender();
        let sender_addrs = bound_payload.sender_addrs().to_vec();
        self.table
            .update(RoutingNode::new(sender, sender_addrs, String::new()))
            .await;

        self.dispatch(request_id, bound_payload, sender).await
    }

    fn mismatch_response(&self, payload: &RequestPayload) -> ResponsePayload {
        let error = Some("sender identity mismatch".to_string());
        match payload {
            RequestPayload::Ping { .. } => ResponsePayload::Ping {
                success: false,
                local_id: self.table.local_id(),
                local_addrs: vec![],
            },
            RequestPayload::FindNode { .. } => ResponsePayload::FindNode {
                success: false,
                closer_peers: vec![],
            },
            RequestPayload::FindValue { .. } => ResponsePayload::FindValue {
                success: false,
                value: None,
                closer_peers: vec![],
            },
            RequestPayload::Store { .. } => ResponsePayload::Store { success: false, error },
            RequestPayload::AddProvider { .. } => ResponsePayload::AddProvider { success: false, error },
            RequestPayload::GetProviders { .. } => ResponsePayload::GetProviders {
                success: false,
                providers: vec![],
                closer_peers: vec![],
            },
            RequestPayload::RemoveProvider { .. } => ResponsePayload::RemoveProvider { success: false, error },
        }
    }

    async fn dispatch(&self, request_id: u64, payload: RequestPayload, sender: NodeId) -> Response {
        let payload = match payload {
            RequestPayload::Ping { .. } => ResponsePayload::Ping {
                success: true,
                local_id: self.table.local_id(),
                local_addrs: vec![],
            },
            RequestPayload::FindNode { target, .. } => {
                let peers = self
                    .table
                    .nearest_peers(&target, self.config.bucket_size)
                    .await;
                ResponsePayload::FindNode {
                    success: true,
                    closer_peers: to_peer_infos(peers),
                }
            }
            RequestPayload::FindValue { key, .. } => {
                let hashed = hash_key_string(&key);
                if let Some(entry) = self.values.get(&hashed).await {
                    ResponsePayload::FindValue {
                        success: true,
                        value: Some(entry.value),
                        closer_peers: vec![],
                    }
                } else {
                    let peers = self
                        .table
                        .nearest_peers(&NodeId::from_bytes(hashed_bytes(&hashed)), self.config.bucket_size)
                        .await;
                    ResponsePayload::FindValue {
                        success: true,
                        value: None,
                        closer_peers: to_peer_infos(peers),
                    }
                }
            }
            RequestPayload::Store { key, value, ttl_secs, .. } => {
                self.handle_store(key, value, ttl_secs, sender).await
            }
            RequestPayload::AddProvider { key, ttl_secs, sender_addrs, .. } => {
                self.handle_add_provider(key, ttl_secs, sender, sender_addrs).await
            }
            RequestPayload::GetProviders { key, .. } => self.handle_get_providers(key).await,
            RequestPayload::RemoveProvider { key, .. } => {
                let hashed = hash_key_string(&key);
                self.providers.remove_provider_local(&hashed, &sender).await;
                ResponsePayload::RemoveProvider {
                    success: true,
                    error: None,
                }
            }
        };
        Response { request_id, payload }
    }

    async fn handle_store(&self, key: String, value: Vec<u8>, ttl_secs: u32, sender: NodeId) -> ResponsePayload {
        if key.is_empty() {
            return ResponsePayload::Store {
                success: false,
                error: Some("empty key".to_string()),
            };
        }
        let clamped_ttl = clamp_secs(ttl_secs, self.config.max_record_age, self.config.max_record_age);

        if key.starts_with(SYS_PEER_PREFIX) {
            if !self.rate_limiters.peer_record_store.check(&sender) {
                warn!(sender = %sender, "peer-record STORE rate limit exceeded");
                return ResponsePayload::Store {
                    success: false,
                    error: Some("rate limited".to_string()),
                };
            }
            if let Err(e) = self.validate_peer_record_store(&key, &value, sender).await {
                warn!(sender = %sender, error = %e, "peer-record STORE validation failed");
                return ResponsePayload::Store {
                    success: false,
                    error: Some(e),
                };
            }
        }

        let hashed = hash_key_string(&key);
        self.values
            .put(
                hashed,
                StoredValue {
                    value,
                    provider: sender,
                    timestamp: SystemTime::now(),
                    ttl: Duration::from_secs(clamped_ttl as u64),
                },
            )
            .await;
        ResponsePayload::Store {
            success: true,
            error: None,
        }
    }

    async fn validate_peer_record_store(
        &self,
        key: &str,
        value: &[u8],
        sender: NodeId,
    ) -> std::result::Result<(), String> {
        let record = SignedPeerRecord::decode_binary(value).map_err(|e| e.to_string())?;
        record.verify_self().map_err(|e| e.to_string())?;
        if record.node_id != sender {
            return Err("publisher may only write their own peer record".to_string());
        }
        if record.is_expired() {
            return Err("peer record is expired".to_string());
        }
        for addr in &record.addrs {
            if !validate_address(addr) {
                return Err(format!("invalid address: {addr}"));
            }
        }
        let hashed = hash_key_string(key);
        if let Some(existing) = self.values.get(&hashed).await {
            if let Ok(existing_record) = SignedPeerRecord::decode_binary(&existing.value) {
                if !record.is_newer_than(&existing_record) {
                    return Err("seqno rollback".to_string());
                }
            }
        }
        Ok(())
    }

    async fn handle_add_provider(
        &self,
        key: String,
        ttl_secs: u32,
        sender: NodeId,
        sender_addrs: Vec<String>,
    ) -> ResponsePayload {
        if !self.rate_limiters.add_provider.check(&sender) {
            warn!(sender = %sender, "ADD_PROVIDER rate limit exceeded");
            return ResponsePayload::AddProvider {
                success: false,
                error: Some("rate limited".to_string()),
            };
        }
        let clamped_ttl = clamp_secs(ttl_secs, self.config.default_provider_ttl, self.config.default_provider_ttl);
        let hashed = hash_key_string(&key);
        self.providers
            .add_provider_local(hashed, sender, sender_addrs, Duration::from_secs(clamped_ttl as u64))
            .await;
        ResponsePayload::AddProvider {
            success: true,
            error: None,
        }
    }

    async fn handle_get_providers(&self, key: String) -> ResponsePayload {
        let hashed = hash_key_string(&key);
        let local = self.providers.get_providers_local(&hashed).await;
        let peers = self
            .table
            .nearest_peers(&NodeId::from_bytes(hashed_bytes(&hashed)), self.config.bucket_size)
            .await;
        ResponsePayload::GetProviders {
            success: true,
            providers: local
                .into_iter()
                .map(|e| ProviderInfo {
                    id: e.id,
                    addrs: e.addrs,
                    timestamp_ns: unix_nanos(e.timestamp),
                    ttl_secs: e.ttl.as_secs() as u32,
                })
                .collect(),
            closer_peers: to_peer_infos(peers),
        }
    }
}

fn to_peer_infos(nodes: Vec<RoutingNode>) -> Vec<PeerInfo> {
    nodes
        .into_iter()
        .map(|n| PeerInfo {
            id: n.id,
            addrs: n.addrs,
        })
        .collect()
}

fn hashed_bytes(hex_str: &str) -> [u8; 32] {
    let bytes = hex::decode(hex_str).unwrap_or_else(|_| vec![0u8; 32]);
    let mut out = [0u8; 32];
    let len = bytes.len().min(32);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}
