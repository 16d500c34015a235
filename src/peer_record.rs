// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Self-verifying, anti-rollback peer address records.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::collaborators::Identity;
use crate::error::{DhtError, Result};
use crate::keyspace::NodeId;

const MAX_PEER_RECORD_TTL: Duration = Duration::from_secs(24 * 3600);
const DEFAULT_PEER_RECORD_TTL: Duration = Duration::from_secs(3600);
const MAX_ADDRS: usize = 100;
const MAX_ADDR_LEN: usize = 1024;
const MAX_SIGNATURE_LEN: usize = 512;
const MIN_BINARY_LEN: usize = 54;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Ed25519,
    EcdsaP256,
    Rsa,
}

/// Self-contained, self-verifying advertisement of a node's addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPeerRecord {
    pub node_id: NodeId,
    pub addrs: Vec<String>,
    pub seqno: u64,
    pub timestamp_ns: i64,
    pub ttl_secs: u32,
    pub key_type: KeyType,
    pub pub_key_bytes: Vec<u8>,
    pub signature: Vec<u8>,
}

fn clamp_ttl(requested: Duration) -> Duration {
    if requested.is_zero() {
        DEFAULT_PEER_RECORD_TTL
    } else if requested > MAX_PEER_RECORD_TTL {
        MAX_PEER_RECORD_TTL
    } else {
        requested
    }
}

fn detect_key_type(pub_key_bytes: &[u8]) -> Option<KeyType> {
    match pub_key_bytes.len() {
        32 => Some(KeyType::Ed25519),
        // SEC1-encoded P-256 public keys are 33 (compressed) or 65 (uncompressed) bytes.
        33 | 65 => Some(KeyType::EcdsaP256),
        n if n > 65 => Some(KeyType::Rsa),
        _ => None,
    }
}

fn digest(
    node_id: &NodeId,
    addrs: &[String],
    seqno: u64,
    timestamp_ns: i64,
    ttl_secs: u32,
) -> [u8; 32] {
    let mut buf = Vec::new();
    buf.extend_from_slice(node_id.as_bytes());
    buf.extend_from_slice(&(addrs.len() as u16).to_be_bytes());
    for addr in addrs {
        let bytes = addr.as_bytes();
        buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        buf.extend_from_slice(bytes);
    }
    buf.extend_from_slice(&seqno.to_be_bytes());
    buf.extend_from_slice(&timestamp_ns.to_be_bytes());
    buf.extend_from_slice(&ttl_secs.to_be_bytes());
    let out = Sha256::digest(&buf);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&out);
    digest
}

impl SignedPeerRecord {
    pub async fn new(
        identity: &dyn Identity,
        addrs: Vec<String>,
        seqno: u64,
        ttl: Duration,
    ) -> Result<Self> {
        let node_id = identity.id();
        let pub_key_bytes = identity.pub_key_bytes();
        let key_type = detect_key_type(&pub_key_bytes)
            .ok_or_else(|| DhtError::validation_failed("unrecognized public key length"))?;
        let ttl_secs = clamp_ttl(ttl).as_secs() as u32;
        let timestamp_ns = now_ns();
        let digest_bytes = digest(&node_id, &addrs, seqno, timestamp_ns, ttl_secs);
        let signature = identity
            .sign(&digest_bytes)
            .await
            .map_err(|e| DhtError::IdentityError {
                reason: e.to_string(),
            })?;

        Ok(Self {
            node_id,
            addrs,
            seqno,
            timestamp_ns,
            ttl_secs,
            key_type,
            pub_key_bytes,
            signature,
        })
    }

    fn digest(&self) -> [u8; 32] {
        digest(
            &self.node_id,
            &self.addrs,
            self.seqno,
            self.timestamp_ns,
            self.ttl_secs,
        )
    }

    /// Verifies the record is self-consistent: the public key hashes to
    /// `node_id`, and the signature verifies over the record's digest under
    /// the declared (or legacy-inferred) key type.
    pub fn verify_self(&self) -> Result<()> {
        if self.pub_key_bytes.is_empty() {
            return Err(DhtError::validation_failed("missing public key"));
        }
        let expected = NodeId::from_public_key_bytes(&self.pub_key_bytes);
        if expected != self.node_id {
            return Err(DhtError::validation_failed("public key does not match node id"));
        }

        let digest_bytes = self.digest();
        if verify_as(self.key_type, &self.pub_key_bytes, &digest_bytes, &self.signature) {
            return Ok(());
        }

        // A record decoded off the wire carries whatever `key_type` the
        // sender declared, unvalidated against `pub_key_bytes`'s actual
        // length (only `new()` runs `detect_key_type`). Retry under the
        // type `pub_key_bytes`'s length implies before failing, so a record
        // with a stale or mistaken declared type still verifies if its key
        // and signature are otherwise consistent.
        if let Some(inferred) = detect_key_type(&self.pub_key_bytes) {
            if inferred != self.key_type
                && verify_as(inferred, &self.pub_key_bytes, &digest_bytes, &self.signature)
            {
                return Ok(());
            }
        }

        Err(DhtError::validation_failed("signature verification failed"))
    }

    pub fn is_newer_than(&self, other: &SignedPeerRecord) -> bool {
        match self.seqno.cmp(&other.seqno) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.timestamp_ns > other.timestamp_ns,
        }
    }

    pub fn is_expired(&self) -> bool {
        let expires_at_ns = self.timestamp_ns + (self.ttl_secs as i64) * 1_000_000_000;
        now_ns() > expires_at_ns
    }

    pub fn encode_binary(&self) -> Result<Vec<u8>> {
        if self.addrs.len() > MAX_ADDRS {
            return Err(DhtError::validation_failed("too many addresses"));
        }
        if self.addrs.iter().any(|a| a.len() > MAX_ADDR_LEN) {
            return Err(DhtError::validation_failed("address too long"));
        }
        if self.signature.len() > MAX_SIGNATURE_LEN {
            return Err(DhtError::validation_failed("signature too long"));
        }
        bincode::serialize(self).map_err(|e| DhtError::EncodingError {
            reason: e.to_string(),
        })
    }

    pub fn decode_binary(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_BINARY_LEN {
            return Err(DhtError::validation_failed("record too short"));
        }
        bincode::deserialize(bytes).map_err(|e| DhtError::EncodingError {
            reason: e.to_string(),
        })
    }

    pub fn encode_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DhtError::EncodingError {
            reason: e.to_string(),
        })
    }

    pub fn decode_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| DhtError::EncodingError {
            reason: e.to_string(),
        })
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

fn verify_as(key_type: KeyType, pub_key_bytes: &[u8], msg: &[u8], sig: &[u8]) -> bool {
    match key_type {
        KeyType::Ed25519 => verify_ed25519(pub_key_bytes, msg, sig),
        KeyType::EcdsaP256 => verify_ecdsa(pub_key_bytes, msg, sig),
        KeyType::Rsa => verify_rsa(pub_key_bytes, msg, sig),
    }
}

fn verify_ed25519(pub_key_bytes: &[u8], msg: &[u8], sig: &[u8]) -> bool {
    match libp2p_identity::ed25519::PublicKey::try_from_bytes(pub_key_bytes) {
        Ok(key) => key.verify(msg, sig),
        Err(_) => false,
    }
}

fn verify_ecdsa(pub_key_bytes: &[u8], msg: &[u8], sig: &[u8]) -> bool {
    match libp2p_identity::ecdsa::PublicKey::try_from_bytes(pub_key_bytes) {
        Ok(key) => key.verify(msg, sig),
        Err(_) => false,
    }
}

fn verify_rsa(pub_key_bytes: &[u8], msg: &[u8], sig: &[u8]) -> bool {
    match libp2p_identity::rsa::PublicKey::try_decode_x509(pub_key_bytes) {
        Ok(key) => key.verify(msg, sig),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockIdentity;

    #[tokio::test]
    async fn round_trips_binary_and_json() {
        let identity = MockIdentity::new_ed25519();
        let record = SignedPeerRecord::new(
            &identity,
            vec!["/ip4/1.2.3.4/udp/4001/quic-v1".to_string()],
            1,
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        let bin = record.encode_binary().unwrap();
        let decoded = SignedPeerRecord::decode_binary(&bin).unwrap();
        assert_eq!(record, decoded);

        let json = record.encode_json().unwrap();
        let decoded_json = SignedPeerRecord::decode_json(&json).unwrap();
        assert_eq!(record, decoded_json);
    }

    #[tokio::test]
    async fn verify_self_falls_back_to_inferred_key_type() {
        let identity = MockIdentity::new_ed25519();
        let mut record = SignedPeerRecord::new(&identity, vec!["/ip4/1.2.3.4/udp/1".into()], 1, Duration::from_secs(60))
            .await
            .unwrap();
        // A wire-decoded record carries whatever key_type the sender
        // declared; simulate one that declared the wrong type for its
        // (otherwise valid) 32-byte Ed25519 key.
        record.key_type = KeyType::EcdsaP256;
        record.verify_self().unwrap();
    }

    #[tokio::test]
    async fn verify_self_rejects_wrong_signature_even_with_fallback() {
        let identity = MockIdentity::new_ed25519();
        let mut record = SignedPeerRecord::new(&identity, vec!["/ip4/1.2.3.4/udp/1".into()], 1, Duration::from_secs(60))
            .await
            .unwrap();
        record.key_type = KeyType::EcdsaP256;
        record.signature = vec![0u8; record.signature.len()];
        assert!(record.verify_self().is_err());
    }

    #[tokio::test]
    async fn verify_self_succeeds_for_freshly_signed_record() {
        let identity = MockIdentity::new_ed25519();
        let record = SignedPeerRecord::new(&identity, vec!["/ip4/1.2.3.4/udp/1".into()], 1, Duration::from_secs(60))
            .await
            .unwrap();
        record.verify_self().unwrap();
    }

    #[tokio::test]
    async fn is_newer_than_orders_by_seqno_then_timestamp() {
        let identity = MockIdentity::new_ed25519();
        let r1 = SignedPeerRecord::new(&identity, vec![], 1, Duration::from_secs(60))
            .await
            .unwrap();
        let r2 = SignedPeerRecord::new(&identity, vec![], 2, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(r2.is_newer_than(&r1));
        assert!(!r1.is_newer_than(&r2));
    }

    #[tokio::test]
    async fn publishing_in_succession_yields_increasing_seqnos() {
        let identity = MockIdentity::new_ed25519();
        let mut last = 0u64;
        for seqno in 1..=5u64 {
            let r = SignedPeerRecord::new(&identity, vec![], seqno, Duration::from_secs(60))
                .await
                .unwrap();
            assert!(r.seqno > last);
            last = r.seqno;
        }
    }
}
