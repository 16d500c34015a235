// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Core Kademlia routing and storage logic for dep2p, a realm-aware
//! multi-tenant peer-to-peer network: the routing table, iterative lookup,
//! local value/provider stores, the inbound request handler, and the
//! periodic maintenance loops that keep a node's view of the network fresh.
//!
//! This crate owns the DHT's decision-making. Opening connections, framing
//! bytes on the wire, and persisting discovered addresses are left to the
//! [`Identity`], [`Transport`], and [`AddressBookWriter`] collaborators a
//! caller injects into [`Dht::new`].

pub mod addr;
pub mod collaborators;
pub mod config;
pub mod dht;
pub mod error;
pub mod handler;
pub mod kbucket;
pub mod keyspace;
pub mod lookup;
pub mod loops;
pub mod ops;
pub mod peer_record;
pub mod protocol;
pub mod rate_limit;
pub mod routing_table;
pub mod store;

pub use collaborators::{AddressBookWriter, Identity, Transport, TransportError};
pub use config::{BootstrapPeer, DhtConfig, Mode};
pub use dht::Dht;
pub use error::{DhtError, Result};
pub use keyspace::{NodeId, RealmId, GLOBAL_REALM};
pub use ops::Operations;
pub use peer_record::SignedPeerRecord;
pub use protocol::{Request, RequestPayload, Response, ResponsePayload};
