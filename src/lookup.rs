// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The α-parallel iterative lookup engine shared by FIND_NODE, FIND_VALUE,
//! and GET_PROVIDERS.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use crate::collaborators::{AddressBookWriter, Transport};
use crate::config::DhtConfig;
use crate::error::{DhtError, Result};
use crate::kbucket::RoutingNode;
use crate::keyspace::NodeId;
use crate::protocol::{PeerInfo, ProviderInfo};
use crate::routing_table::RoutingTable;

#[derive(Debug, Clone)]
pub enum LookupKind {
    FindNode,
    FindValue,
    GetProviders,
}

#[derive(Debug, Default)]
pub struct LookupOutcome {
    pub value: Option<Vec<u8>>,
    pub providers: Vec<ProviderInfo>,
    pub closest: Vec<PeerInfo>,
}

struct Candidate {
    peer: PeerInfo,
    queried: bool,
}

/// Runs the iterative lookup for `kind` against `target_key`, using
/// `fanout_key` (the same value for FIND_NODE, the hashed key for
/// FIND_VALUE/GET_PROVIDERS) to rank candidates by XOR distance.
///
/// Bounded by `config.query_timeout` overall and `config.request_timeout`
/// per probe. Per the propagation policy, a discovery lookup (FIND_NODE,
/// GET_PROVIDERS) that runs past its deadline returns the partial results
/// gathered so far; a value lookup that hasn't found the value yet returns
/// [`DhtError::Timeout`].
pub async fn run(
    table: &RoutingTable,
    transport: &dyn Transport,
    address_book: &dyn AddressBookWriter,
    config: &DhtConfig,
    fanout_key: NodeId,
    target_for_find_node: Option<NodeId>,
    lookup_key: Option<String>,
    kind: LookupKind,
) -> Result<LookupOutcome> {
    let deadline = tokio::time::Instant::now() + config.query_timeout;
    let initial_count = match kind {
        LookupKind::FindNode => config.alpha,
        _ => config.bucket_size,
    };
    let initial = table.nearest_peers(&fanout_key, initial_count).await;
    let mut candidates: Vec<Candidate> = initial
        .into_iter()
        .map(|n| Candidate {
            peer: PeerInfo {
                id: n.id,
                addrs: n.addrs,
            },
            queried: false,
        })
        .collect();

    let mut seen: HashSet<NodeId> = candidates.iter().map(|c| c.peer.id).collect();
    let mut outcome = LookupOutcome::default();
    let mut timed_out = false;

    for _round in 0..config.max_lookup_rounds {
        let to_query: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.queried)
            .take(config.alpha)
            .map(|(i, _)| i)
            .collect();
        if to_query.is_empty() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            timed_out = true;
            break;
        }
        for &i in &to_query {
            candidates[i].queried = true;
        }

        let futures = to_query.iter().map(|&i| {
            let peer = candidates[i].peer.clone();
            let kind = kind.clone();
            let lookup_key = lookup_key.clone();
            async move {
                let probe = probe(transport, &peer, kind, target_for_find_node, lookup_key.as_deref());
                tokio::time::timeout(config.request_timeout, probe).await.ok().flatten()
            }
        });
        let results = join_all(futures).await;

        let mut new_peers = Vec::new();
        for result in results.into_iter().flatten() {
            if let Some(value) = result.value {
                outcome.value = Some(value);
            }
            outcome.providers.extend(result.providers);
            new_peers.extend(result.closer_peers);
        }

        for peer in &new_peers {
            if seen.insert(peer.id) {
                table
                    .update(RoutingNode::new(peer.id, peer.addrs.clone(), String::new()))
                    .await;
                address_book.add(&peer.id, &peer.addrs).await;
            }
        }

        if matches!(kind, LookupKind::FindValue) && outcome.value.is_some() {
            break;
        }

        for peer in new_peers {
            if !candidates.iter().any(|c| c.peer.id == peer.id) {
                candidates.push(Candidate {
                    peer,
                    queried: false,
                });
            }
        }
        candidates.sort_by(|a, b| a.peer.id.distance(&fanout_key).0.cmp(&b.peer.id.distance(&fanout_key).0));
        candidates.truncate(config.bucket_size);
    }

    if timed_out && matches!(kind, LookupKind::FindValue) && outcome.value.is_none() {
        return Err(DhtError::Timeout);
    }

    outcome.closest = candidates.into_iter().map(|c| c.peer).collect();
    Ok(outcome)
}

struct ProbeResult {
    value: Option<Vec<u8>>,
    providers: Vec<ProviderInfo>,
    closer_peers: Vec<PeerInfo>,
}

async fn probe(
    transport: &dyn Transport,
    peer: &PeerInfo,
    kind: LookupKind,
    target: Option<NodeId>,
    key: Option<&str>,
) -> Option<ProbeResult> {
    match kind {
        LookupKind::FindNode => {
            let target = target?;
            let result = transport.send_find_node(&peer.id, &peer.addrs, &target).await.ok()?;
            Some(ProbeResult {
                value: None,
                providers: vec![],
                closer_peers: result.closer_peers,
            })
        }
        LookupKind::FindValue => {
            let key = key?;
            let result = transport.send_find_value(&peer.id, &peer.addrs, key).await.ok()?;
            Some(ProbeResult {
                value: result.value,
                providers: vec![],
                closer_peers: result.closer_peers,
            })
        }
        LookupKind::GetProviders => {
            let key = key?;
            let result = transport.send_get_providers(&peer.id, &peer.addrs, key).await.ok()?;
            Some(ProbeResult {
                value: None,
                providers: result.providers,
                closer_peers: result.closer_peers,
            })
        }
    }
}

pub type SharedTransport = Arc<dyn Transport>;
pub type SharedAddressBook = Arc<dyn AddressBookWriter>;
