// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Capability bundles the core depends on but does not implement: identity
//! signing, the network transport, and the address book. All are injected
//! at construction time; there is no "set after the fact" path.

use async_trait::async_trait;
use std::fmt;

use crate::keyspace::NodeId;
use crate::protocol::{PeerInfo, ProviderInfo};

/// Signs on the local node's behalf and exposes the identity needed to build
/// self-verifying peer records.
#[async_trait]
pub trait Identity: Send + Sync {
    fn id(&self) -> NodeId;
    fn pub_key_bytes(&self) -> Vec<u8>;
    async fn sign(&self, bytes: &[u8]) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("transport error: {0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub struct FindNodeResult {
    pub closer_peers: Vec<PeerInfo>,
}

#[derive(Debug, Clone)]
pub struct FindValueResult {
    pub value: Option<Vec<u8>>,
    pub closer_peers: Vec<PeerInfo>,
}

#[derive(Debug, Clone)]
pub struct GetProvidersResult {
    pub providers: Vec<ProviderInfo>,
    pub closer_peers: Vec<PeerInfo>,
}

/// The external collaborator that opens streams and dials peers. Dialing
/// prefers already-known addresses (routing table, then AddressBook) before
/// falling back to addresses carried in-band, to avoid recursive discovery.
#[async_trait]
pub trait Transport: Send + Sync {
    fn local_id(&self) -> NodeId;
    fn local_addrs(&self) -> Vec<String>;
    async fn update_local_addrs(&self, addrs: Vec<String>);

    async fn send_ping(&self, peer: &NodeId, addrs: &[String]) -> std::result::Result<PeerInfo, TransportError>;

    async fn send_find_node(
        &self,
        peer: &NodeId,
        addrs: &[String],
        target: &NodeId,
    ) -> std::result::Result<FindNodeResult, TransportError>;

    async fn send_find_value(
        &self,
        peer: &NodeId,
        addrs: &[String],
        key: &str,
    ) -> std::result::Result<FindValueResult, TransportError>;

    async fn send_store(
        &self,
        peer: &NodeId,
        addrs: &[String],
        key: &str,
        value: &[u8],
        ttl_secs: u32,
    ) -> std::result::Result<(), TransportError>;

    async fn send_add_provider(
        &self,
        peer: &NodeId,
        addrs: &[String],
        key: &str,
        ttl_secs: u32,
    ) -> std::result::Result<(), TransportError>;

    async fn send_get_providers(
        &self,
        peer: &NodeId,
        addrs: &[String],
        key: &str,
    ) -> std::result::Result<GetProvidersResult, TransportError>;

    async fn send_remove_provider(
        &self,
        peer: &NodeId,
        addrs: &[String],
        key: &str,
    ) -> std::result::Result<(), TransportError>;
}

/// Sink for addresses discovered for a node, maintained outside the core.
#[async_trait]
pub trait AddressBookWriter: Send + Sync {
    async fn add(&self, node_id: &NodeId, addrs: &[String]);
}

impl fmt::Debug for dyn Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.id())
    }
}

#[cfg(test)]
pub struct MockIdentity {
    id: NodeId,
    pub_key_bytes: Vec<u8>,
    keypair: libp2p_identity::Keypair,
}

#[cfg(test)]
impl MockIdentity {
    pub fn new_ed25519() -> Self {
        let keypair = libp2p_identity::Keypair::generate_ed25519();
        let ed25519 = keypair
            .clone()
            .try_into_ed25519()
            .expect("freshly generated keypair is ed25519");
        let pub_key_bytes = ed25519.public().to_bytes().to_vec();
        let id = NodeId::from_public_key_bytes(&pub_key_bytes);
        Self {
            id,
            pub_key_bytes,
            keypair,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Identity for MockIdentity {
    fn id(&self) -> NodeId {
        self.id
    }

    fn pub_key_bytes(&self) -> Vec<u8> {
        self.pub_key_bytes.clone()
    }

    async fn sign(&self, bytes: &[u8]) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        self.keypair.sign(bytes).map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}

#[cfg(test)]
pub struct NullAddressBook;

#[cfg(test)]
#[async_trait]
impl AddressBookWriter for NullAddressBook {
    async fn add(&self, _node_id: &NodeId, _addrs: &[String]) {}
}
