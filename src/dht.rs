// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Top-level entry point wiring the routing table, local stores, rate
//! limiters, inbound handler, public operations, and background loops
//! together into one handle.

use std::sync::Arc;

use tracing::info;

use crate::collaborators::{AddressBookWriter, Identity, Transport};
use crate::config::DhtConfig;
use crate::error::Result;
use crate::handler::InboundHandler;
use crate::keyspace::NodeId;
use crate::loops::{self, Background};
use crate::ops::{Operations, SeqnoCounter};
use crate::protocol::{Request, Response};
use crate::rate_limit::RateLimiters;
use crate::routing_table::RoutingTable;
use crate::store::{ProviderStore, ValueStore};

/// A running realm-aware Kademlia node: the routing table, local stores,
/// inbound request handling, the public put/get/announce/find API, and the
/// periodic maintenance loops, all sharing one set of collaborators.
pub struct Dht {
    table: Arc<RoutingTable>,
    values: Arc<ValueStore>,
    providers: Arc<ProviderStore>,
    rate_limiters: Arc<RateLimiters>,
    handler: InboundHandler,
    ops: Arc<Operations>,
    background: Option<Background>,
}

impl Dht {
    /// Builds a node around the given identity/transport/address-book
    /// collaborators. Background loops are not started until [`Dht::start`]
    /// is called.
    pub fn new(
        config: DhtConfig,
        identity: Arc<dyn Identity>,
        transport: Arc<dyn Transport>,
        address_book: Arc<dyn AddressBookWriter>,
    ) -> Self {
        let local_id = identity.id();
        let config = Arc::new(config);
        let table = Arc::new(RoutingTable::new_for_realm(local_id, config.realm_id.clone()));
        let values = Arc::new(ValueStore::new());
        let providers = Arc::new(ProviderStore::new());
        let rate_limiters = Arc::new(RateLimiters::new(
            config.store_rate_limit_per_min,
            config.add_provider_rate_limit_per_min,
        ));

        let handler = InboundHandler::new(
            table.clone(),
            values.clone(),
            providers.clone(),
            rate_limiters.clone(),
            config.clone(),
        );

        let ops = Arc::new(Operations {
            table: table.clone(),
            values: values.clone(),
            providers: providers.clone(),
            transport,
            address_book,
            identity,
            config,
            seqno: Arc::new(SeqnoCounter::new()),
        });

        Self {
            table,
            values,
            providers,
            rate_limiters,
            handler,
            ops,
            background: None,
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.table.local_id()
    }

    /// Spawns the periodic bootstrap/refresh/cleanup/republish/rate-limit
    /// purge loops. Calling this more than once leaks the previous set of
    /// tasks; callers should [`Dht::stop`] first.
    pub fn start(&mut self) {
        info!(local_id = %self.local_id(), "starting background maintenance loops");
        self.background = Some(Background::spawn(self.ops.clone(), self.rate_limiters.clone()));
    }

    /// Aborts every background task. The node remains usable for direct
    /// `operations()`/`handle_request()` calls after stopping.
    pub fn stop(&mut self) {
        if let Some(background) = self.background.take() {
            background.stop();
        }
    }

    /// The public put/get/announce/find API.
    pub fn operations(&self) -> &Operations {
        &self.ops
    }

    /// Processes one inbound request from `trusted_remote_id`.
    pub async fn handle_request(&self, request: Request, trusted_remote_id: NodeId) -> Response {
        self.handler.handle(request, trusted_remote_id).await
    }

    /// Notifies the node that the transport has established a connection to
    /// `id` at `addrs`, inserting it into the routing table immediately
    /// rather than waiting to observe it via a request.
    pub async fn notify_peer_connected(&self, id: NodeId, addrs: Vec<String>) {
        loops::notify_peer_connected(self.ops.clone(), id, addrs).await;
    }

    pub async fn bootstrap(&self) {
        loops::bootstrap(&self.ops).await;
    }

    pub async fn is_empty(&self) -> bool {
        self.table.is_empty().await
    }

    pub async fn routing_table_len(&self) -> usize {
        self.table.len().await
    }
}

impl Drop for Dht {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FindNodeResult, FindValueResult, GetProvidersResult, MockIdentity, NullAddressBook, TransportError};
    use crate::protocol::PeerInfo;
    use async_trait::async_trait;

    struct NullTransport {
        id: NodeId,
    }

    #[async_trait]
    impl Transport for NullTransport {
        fn local_id(&self) -> NodeId {
            self.id
        }
        fn local_addrs(&self) -> Vec<String> {
            vec![]
        }
        async fn update_local_addrs(&self, _addrs: Vec<String>) {}
        async fn send_ping(&self, peer: &NodeId, _addrs: &[String]) -> std::result::Result<PeerInfo, TransportError> {
            Ok(PeerInfo { id: *peer, addrs: vec![] })
        }
        async fn send_find_node(
            &self,
            _peer: &NodeId,
            _addrs: &[String],
            _target: &NodeId,
        ) -> std::result::Result<FindNodeResult, TransportError> {
            Ok(FindNodeResult { closer_peers: vec![] })
        }
        async fn send_find_value(
            &self,
            _peer: &NodeId,
            _addrs: &[String],
            _key: &str,
        ) -> std::result::Result<FindValueResult, TransportError> {
            Ok(FindValueResult { value: None, closer_peers: vec![] })
        }
        async fn send_store(
            &self,
            _peer: &NodeId,
            _addrs: &[String],
            _key: &str,
            _value: &[u8],
            _ttl_secs: u32,
        ) -> std::result::Result<(), TransportError> {
            Ok(())
        }
        async fn send_add_provider(
            &self,
            _peer: &NodeId,
            _addrs: &[String],
            _key: &str,
            _ttl_secs: u32,
        ) -> std::result::Result<(), TransportError> {
            Ok(())
        }
        async fn send_get_providers(
            &self,
            _peer: &NodeId,
            _addrs: &[String],
            _key: &str,
        ) -> std::result::Result<GetProvidersResult, TransportError> {
            Ok(GetProvidersResult { providers: vec![], closer_peers: vec![] })
        }
        async fn send_remove_provider(
            &self,
            _peer: &NodeId,
            _addrs: &[String],
            _key: &str,
        ) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    fn build() -> Dht {
        let identity = Arc::new(MockIdentity::new_ed25519());
        let local_id = identity.id();
        Dht::new(
            DhtConfig::default(),
            identity,
            Arc::new(NullTransport { id: local_id }),
            Arc::new(NullAddressBook),
        )
    }

    #[tokio::test]
    async fn put_then_get_round_trips_locally() {
        let dht = build();
        dht.operations().put_value("greeting", b"hello".to_vec()).await.unwrap();
        let value = dht.operations().get_value("greeting").await.unwrap();
        assert_eq!(value, b"hello");
    }

    #[tokio::test]
    async fn announce_and_get_providers_round_trip_within_a_realm() {
        let identity = Arc::new(MockIdentity::new_ed25519());
        let local_id = identity.id();
        let mut config = DhtConfig::default();
        config.realm_id = "realm-chat".to_string();
        let dht = Dht::new(
            config,
            identity,
            Arc::new(NullTransport { id: local_id }),
            Arc::new(NullAddressBook),
        );
        dht.operations().add_provider("chat").await.unwrap();
        let providers = dht.operations().get_providers("chat").await.unwrap();
        assert!(providers.iter().any(|p| p.id == local_id));
    }

    #[tokio::test]
    async fn notify_peer_connected_populates_table() {
        let dht = build();
        let peer = NodeId::from_bytes([7u8; 32]);
        dht.notify_peer_connected(peer, vec!["/ip4/1.2.3.4/udp/1/quic-v1".to_string()])
            .await;
        assert_eq!(dht.routing_table_len().await, 1);
    }

    #[tokio::test]
    async fn start_and_stop_do_not_panic() {
        let mut dht = build();
        dht.start();
        dht.stop();
    }
}
