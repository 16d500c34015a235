// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Canonical key strings, XOR-metric distance, and namespace normalization.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub const KEY_SIZE: usize = 32;
const KEY_PREFIX: &str = "dep2p/v1";

/// 256-bit point in the Kademlia XOR-metric space.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub [u8; KEY_SIZE]);

impl NodeId {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Derives a NodeID from a public key's raw bytes (`SHA-256(pub_key_bytes)`).
    pub fn from_public_key_bytes(pub_key_bytes: &[u8]) -> Self {
        let digest = Sha256::digest(pub_key_bytes);
        let mut out = [0u8; KEY_SIZE];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn distance(&self, other: &NodeId) -> Distance {
        xor_distance(&self.0, &other.0)
    }

    /// Position of the first differing bit between `self` and `target`, 0-based
    /// from the most significant bit. An identical target yields `KEY_SIZE*8 - 1`.
    pub fn bucket_index(&self, target: &NodeId) -> usize {
        bucket_index(&self.0, &target.0)
    }

    /// Flips bit `idx` of `self` and fills the remaining bits with cryptographic
    /// randomness, yielding a target that belongs to bucket `idx`.
    pub fn random_in_bucket(&self, idx: usize) -> NodeId {
        random_id_in_bucket(&self.0, idx)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid base58 NodeID: {0}")]
pub struct NodeIdParseError(String);

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| NodeIdParseError(e.to_string()))?;
        let bytes: [u8; KEY_SIZE] = decoded
            .try_into()
            .map_err(|_| NodeIdParseError(format!("expected {KEY_SIZE} bytes", KEY_SIZE = KEY_SIZE)))?;
        Ok(NodeId(bytes))
    }
}

/// Opaque tenant scope. Empty string (or the `GLOBAL` sentinel) means
/// "system/global scope".
pub type RealmId = String;

pub const GLOBAL_REALM: &str = "";

/// Byte-wise XOR of two 32-byte keys; shorter inputs are conceptually
/// zero-padded, though callers always pass `KEY_SIZE`-length arrays.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance(pub [u8; KEY_SIZE]);

pub fn xor_distance(a: &[u8; KEY_SIZE], b: &[u8; KEY_SIZE]) -> Distance {
    let mut out = [0u8; KEY_SIZE];
    for i in 0..KEY_SIZE {
        out[i] = a[i] ^ b[i];
    }
    Distance(out)
}

/// Number of leading zero bits in `xor_distance(a, b)`.
pub fn common_prefix_length(a: &[u8; KEY_SIZE], b: &[u8; KEY_SIZE]) -> usize {
    let d = xor_distance(a, b);
    let mut zeros = 0usize;
    for byte in d.0.iter() {
        if *byte == 0 {
            zeros += 8;
        } else {
            zeros += byte.leading_zeros() as usize;
            break;
        }
    }
    zeros
}

/// Position of the first differing bit between `local` and `target`
/// (0-based from the MSB). A target identical to `local` yields
/// `KEY_SIZE * 8 - 1` by the convention the specification states.
pub fn bucket_index(local: &[u8; KEY_SIZE], target: &[u8; KEY_SIZE]) -> usize {
    let cpl = common_prefix_length(local, target);
    if cpl >= KEY_SIZE * 8 {
        KEY_SIZE * 8 - 1
    } else {
        cpl
    }
}

/// Produces a target ID that falls in bucket `idx` relative to `local`:
/// keeps the leading `idx` bits of `local`, flips bit `idx`, and fills
/// everything after with cryptographically secure randomness.
pub fn random_id_in_bucket(local: &[u8; KEY_SIZE], idx: usize) -> NodeId {
    let mut out = *local;
    let byte_idx = idx / 8;
    let bit_in_byte = 7 - (idx % 8);
    if byte_idx < KEY_SIZE {
        out[byte_idx] ^= 1 << bit_in_byte;
        // Randomize every bit strictly after the flipped one.
        let mut rng = rand::thread_rng();
        if bit_in_byte > 0 {
            let mask: u8 = (1u8 << bit_in_byte) - 1;
            let mut rand_byte = [0u8; 1];
            rng.fill_bytes(&mut rand_byte);
            out[byte_idx] = (out[byte_idx] & !mask) | (rand_byte[0] & mask);
        }
        if byte_idx + 1 < KEY_SIZE {
            rng.fill_bytes(&mut out[byte_idx + 1..]);
        }
    }
    NodeId(out)
}

/// SHA-256 of an arbitrary key string; used for storage and distance.
pub fn hash_key(s: &str) -> [u8; KEY_SIZE] {
    let digest = Sha256::digest(s.as_bytes());
    let mut out = [0u8; KEY_SIZE];
    out.copy_from_slice(&digest);
    out
}

/// Hex-encoded `hash_key`, used as a map key in the local stores.
pub fn hash_key_string(s: &str) -> String {
    hex::encode(hash_key(s))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Sys,
    Realm,
}

/// Strips `sys:`/`sys/` prefixes, trims whitespace, and decides the scope a
/// caller-supplied namespace resolves to. Always resolves to `Sys` today;
/// realm-scoped input reaches `build_key_string` directly via `realm_id`.
pub struct NormalizedNamespace {
    pub scope: Scope,
    pub payload: String,
}

pub fn normalize_namespace(namespace: &str) -> NormalizedNamespace {
    let trimmed = namespace.trim();
    let payload = if let Some(rest) = trimmed.strip_prefix("sys:") {
        rest.trim()
    } else if let Some(rest) = trimmed.strip_prefix("sys/") {
        rest.trim()
    } else {
        trimmed
    };
    NormalizedNamespace {
        scope: Scope::Sys,
        payload: payload.to_string(),
    }
}

/// Builds a canonical key string: `dep2p/v1/sys/<type>/<payload>` or
/// `dep2p/v1/realm/<realmID>/<type>/<payload>`. An empty `realm_id` under
/// `Scope::Realm` falls back to `sys`.
pub fn build_key_string(scope: Scope, key_type: &str, realm_id: &str, payload: &str) -> String {
    match scope {
        Scope::Sys => format!("{KEY_PREFIX}/sys/{key_type}/{payload}"),
        Scope::Realm if realm_id.is_empty() => format!("{KEY_PREFIX}/sys/{key_type}/{payload}"),
        Scope::Realm => format!("{KEY_PREFIX}/realm/{realm_id}/{key_type}/{payload}"),
    }
}

/// Canonical key for a system-scoped provider namespace.
pub fn provider_key(namespace: &str) -> String {
    let n = normalize_namespace(namespace);
    build_key_string(Scope::Sys, &n.payload, "", "")
        .trim_end_matches('/')
        .to_string()
}

/// Canonical key for a realm-scoped provider namespace. Falls back to the
/// system scope when `realm_id` is empty, per `build_key_string`.
pub fn realm_provider_key(realm_id: &str, namespace: &str) -> String {
    let n = normalize_namespace(namespace);
    build_key_string(Scope::Realm, &n.payload, realm_id, "")
        .trim_end_matches('/')
        .to_string()
}

/// `dep2p/v1/sys/peer/<NodeID-base58>`
pub fn peer_record_key(node_id: &NodeId) -> String {
    format!("{KEY_PREFIX}/sys/peer/{node_id}")
}

pub const SYS_PEER_PREFIX: &str = "dep2p/v1/sys/peer/";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_identity_and_symmetry() {
        let a = NodeId::from_bytes([0xAB; KEY_SIZE]);
        let b = NodeId::from_bytes([0x12; KEY_SIZE]);
        assert_eq!(a.distance(&a).0, [0u8; KEY_SIZE]);
        assert_eq!(a.distance(&b).0, b.distance(&a).0);
    }

    #[test]
    fn bucket_index_self_is_last_bucket() {
        let a = NodeId::from_bytes([0x42; KEY_SIZE]);
        assert_eq!(a.bucket_index(&a), KEY_SIZE * 8 - 1);
    }

    #[test]
    fn namespace_normalization_is_idempotent_and_matches_variants() {
        for raw in ["sys/foo", "sys:foo", "foo", "  foo  "] {
            let n1 = normalize_namespace(raw);
            let n2 = normalize_namespace(&n1.payload);
            assert_eq!(n1.payload, n2.payload);
            assert_eq!(n1.payload, "foo");
        }
    }

    #[test]
    fn realm_provider_key_scopes_by_realm_and_falls_back_to_sys() {
        assert_eq!(realm_provider_key("alpha", "chat"), "dep2p/v1/realm/alpha/chat");
        assert_eq!(realm_provider_key("", "chat"), provider_key("chat"));
    }

    #[test]
    fn build_key_string_realm_falls_back_to_sys_when_empty() {
        let k1 = build_key_string(Scope::Realm, "chat", "", "x");
        let k2 = build_key_string(Scope::Sys, "chat", "", "x");
        assert_eq!(k1, k2);
    }

    #[test]
    fn node_id_base58_round_trips() {
        let id = NodeId::from_bytes([7u8; KEY_SIZE]);
        let s = id.to_string();
        let parsed: NodeId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    quickcheck::quickcheck! {
        fn prop_distance_commutative(a: Vec<u8>, b: Vec<u8>) -> bool {
            let mut ab = [0u8; KEY_SIZE];
            let mut bb = [0u8; KEY_SIZE];
            for i in 0..KEY_SIZE {
                ab[i] = *a.get(i).unwrap_or(&0);
                bb[i] = *b.get(i).unwrap_or(&0);
            }
            xor_distance(&ab, &bb).0 == xor_distance(&bb, &ab).0
        }

        fn prop_distance_identity(a: Vec<u8>) -> bool {
            let mut ab = [0u8; KEY_SIZE];
            for i in 0..KEY_SIZE {
                ab[i] = *a.get(i).unwrap_or(&0);
            }
            xor_distance(&ab, &ab).0 == [0u8; KEY_SIZE]
        }
    }
}
