// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Background tasks: bootstrap (+retry), bucket refresh, store cleanup,
//! peer-record republish, and the notify-on-connect hook.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::kbucket::RoutingNode;
use crate::lookup::{self, LookupKind};
use crate::ops::Operations;
use crate::rate_limit::RateLimiters;

pub struct Background {
    handles: Vec<JoinHandle<()>>,
}

impl Background {
    pub fn spawn(ops: Arc<Operations>, rate_limiters: Arc<RateLimiters>) -> Self {
        let mut handles = Vec::new();
        handles.push(tokio::spawn(bootstrap_retry_loop(ops.clone())));
        handles.push(tokio::spawn(refresh_loop(ops.clone())));
        handles.push(tokio::spawn(cleanup_loop(ops.clone())));
        handles.push(tokio::spawn(republish_loop(ops.clone())));
        handles.push(tokio::spawn(rate_limit_purge_loop(ops, rate_limiters)));
        Self { handles }
    }

    pub fn stop(self) {
        for h in self.handles {
            h.abort();
        }
    }
}

/// Inserts configured bootstrap peers, runs a self-FIND_NODE to populate
/// buckets, then triggers a bucket refresh.
pub async fn bootstrap(ops: &Operations) {
    for peer in &ops.config.bootstrap_peers {
        ops.table
            .update(RoutingNode::new(peer.id, peer.addrs.clone(), String::new()))
            .await;
    }
    let local_id = ops.table.local_id();
    let _ = ops.find_peer(&local_id).await;
    refresh_buckets(ops).await;
}

async fn bootstrap_retry_loop(ops: Arc<Operations>) {
    tokio::time::sleep(ops.config.bootstrap_retry_initial_delay).await;
    loop {
        if !ops.table.is_empty().await {
            debug!("routing table non-empty, ending bootstrap retry loop");
            return;
        }
        bootstrap(&ops).await;
        if !ops.table.is_empty().await {
            return;
        }
        tokio::time::sleep(ops.config.bootstrap_retry_interval).await;
    }
}

async fn refresh_buckets(ops: &Operations) {
    let now = Instant::now();
    let stale = ops
        .table
        .buckets_needing_refresh(now, ops.config.bucket_refresh_interval)
        .await;
    for idx in stale {
        let target = ops.table.random_id_in_bucket(idx);
        let _ = lookup::run(
            &ops.table,
            ops.transport.as_ref(),
            ops.address_book.as_ref(),
            &ops.config,
            target,
            Some(target),
            None,
            LookupKind::FindNode,
        )
        .await;
        ops.table.mark_refreshed(idx, now).await;
    }
}

async fn refresh_loop(ops: Arc<Operations>) {
    let mut ticker = tokio::time::interval(ops.config.refresh_interval);
    loop {
        ticker.tick().await;
        if ops.table.is_empty().await {
            bootstrap(&ops).await;
        } else {
            refresh_buckets(&ops).await;
        }
    }
}

async fn cleanup_loop(ops: Arc<Operations>) {
    let mut ticker = tokio::time::interval(ops.config.cleanup_interval);
    loop {
        ticker.tick().await;
        ops.table.cleanup(ops.config.node_expire_time).await;
        ops.values.cleanup().await;
        ops.providers.cleanup().await;
    }
}

async fn republish_loop(ops: Arc<Operations>) {
    let mut ticker = tokio::time::interval(ops.config.peer_record_republish_interval);
    loop {
        ticker.tick().await;
        let addrs = ops.transport.local_addrs();
        if addrs.is_empty() {
            continue;
        }
        if let Err(e) = ops.publish_peer_record(addrs).await {
            warn!(error = %e, "peer record republish failed");
        }
    }
}

async fn rate_limit_purge_loop(ops: Arc<Operations>, rate_limiters: Arc<RateLimiters>) {
    let mut ticker = tokio::time::interval(ops.config.rate_limit_purge_interval);
    let idle_after = ops.config.rate_limit_purge_interval * 2;
    loop {
        ticker.tick().await;
        rate_limiters.purge_idle(idle_after);
    }
}

/// Called when the transport reports a freshly connected peer. Inserts it
/// into the routing table; if the table was empty, spawns an immediate
/// bootstrap rather than waiting for the retry loop's next tick.
pub async fn notify_peer_connected(ops: Arc<Operations>, id: crate::keyspace::NodeId, addrs: Vec<String>) {
    let was_empty = ops.table.is_empty().await;
    ops.table.update(RoutingNode::new(id, addrs, String::new())).await;
    if was_empty && !ops.table.is_empty().await {
        info!("routing table transitioned from empty, scheduling bootstrap");
        tokio::spawn(async move {
            bootstrap(&ops).await;
        });
    }
}
