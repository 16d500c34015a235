// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Runtime configuration for the DHT core.

use std::time::Duration;

use crate::keyspace::{NodeId, RealmId, GLOBAL_REALM};

/// Operating mode: whether this node advertises itself as dialable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Auto,
    Server,
    Client,
}

/// A bootstrap peer known ahead of time.
#[derive(Debug, Clone)]
pub struct BootstrapPeer {
    pub id: NodeId,
    pub addrs: Vec<String>,
}

/// All tunables recognized by the core, with the defaults named in the
/// external-collaborators section of the specification this crate implements.
#[derive(Debug, Clone)]
pub struct DhtConfig {
    pub mode: Mode,
    /// The realm this node's routing table serves. `GLOBAL_REALM` for the
    /// system/global scope; a node joining more than one realm runs one
    /// `Dht` (and one `RoutingTable`) per realm.
    pub realm_id: RealmId,
    pub bucket_size: usize,
    pub alpha: usize,
    pub query_timeout: Duration,
    pub request_timeout: Duration,
    pub refresh_interval: Duration,
    pub replication_factor: usize,
    pub enable_value_store: bool,
    pub max_record_age: Duration,
    pub bootstrap_peers: Vec<BootstrapPeer>,

    pub default_provider_ttl: Duration,
    pub max_peer_record_ttl: Duration,
    pub default_peer_record_ttl: Duration,
    pub node_expire_time: Duration,
    pub bucket_refresh_interval: Duration,
    pub peer_record_republish_interval: Duration,
    pub cleanup_interval: Duration,
    pub rate_limit_purge_interval: Duration,
    pub store_rate_limit_per_min: u32,
    pub add_provider_rate_limit_per_min: u32,
    pub max_lookup_rounds: usize,
    pub bootstrap_retry_initial_delay: Duration,
    pub bootstrap_retry_interval: Duration,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Auto,
            realm_id: GLOBAL_REALM.to_string(),
            bucket_size: 20,
            alpha: 3,
            query_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(3600),
            replication_factor: 3,
            enable_value_store: true,
            max_record_age: Duration::from_secs(24 * 3600),
            bootstrap_peers: Vec::new(),

            default_provider_ttl: Duration::from_secs(24 * 3600),
            max_peer_record_ttl: Duration::from_secs(24 * 3600),
            default_peer_record_ttl: Duration::from_secs(3600),
            node_expire_time: Duration::from_secs(24 * 3600),
            bucket_refresh_interval: Duration::from_secs(3600),
            peer_record_republish_interval: Duration::from_secs(20 * 60),
            cleanup_interval: Duration::from_secs(10 * 60),
            rate_limit_purge_interval: Duration::from_secs(5 * 60),
            store_rate_limit_per_min: 10,
            add_provider_rate_limit_per_min: 50,
            max_lookup_rounds: 10,
            bootstrap_retry_initial_delay: Duration::from_secs(5),
            bootstrap_retry_interval: Duration::from_secs(30),
        }
    }
}
