// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Wire message types and length-prefixed framing for the single DHT protocol.

use serde::{Deserialize, Serialize};

use crate::error::{DhtError, Result};
use crate::keyspace::NodeId;

/// Maximum encoded frame size: 1 MiB.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: NodeId,
    pub addrs: Vec<String>,
    pub timestamp_ns: i64,
    pub ttl_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: NodeId,
    pub addrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: u64,
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestPayload {
    Ping {
        sender: NodeId,
        sender_addrs: Vec<String>,
    },
    FindNode {
        sender: NodeId,
        sender_addrs: Vec<String>,
        target: NodeId,
    },
    FindValue {
        sender: NodeId,
        sender_addrs: Vec<String>,
        key: String,
    },
    Store {
        sender: NodeId,
        sender_addrs: Vec<String>,
        key: String,
        value: Vec<u8>,
        ttl_secs: u32,
    },
    AddProvider {
        sender: NodeId,
        sender_addrs: Vec<String>,
        key: String,
        ttl_secs: u32,
    },
    GetProviders {
        sender: NodeId,
        sender_addrs: Vec<String>,
        key: String,
    },
    RemoveProvider {
        sender: NodeId,
        sender_addrs: Vec<String>,
        key: String,
    },
}

impl RequestPayload {
    pub fn sender(&self) -> &NodeId {
        match self {
            RequestPayload::Ping { sender, .. }
            | RequestPayload::FindNode { sender, .. }
            | RequestPayload::FindValue { sender, .. }
            | RequestPayload::Store { sender, .. }
            | RequestPayload::AddProvider { sender, .. }
            | RequestPayload::GetProviders { sender, .. }
            | RequestPayload::RemoveProvider { sender, .. } => sender,
        }
    }

    pub fn sender_addrs(&self) -> &[String] {
        match self {
            RequestPayload::Ping { sender_addrs, .. }
            | RequestPayload::FindNode { sender_addrs, .. }
            | RequestPayload::FindValue { sender_addrs, .. }
            | RequestPayload::Store { sender_addrs, .. }
            | RequestPayload::AddProvider { sender_addrs, .. }
            | RequestPayload::GetProviders { sender_addrs, .. }
            | RequestPayload::RemoveProvider { sender_addrs, .. } => sender_addrs,
        }
    }

    pub fn with_sender(self, sender: NodeId) -> Self {
        match self {
            RequestPayload::Ping { sender_addrs, .. } => RequestPayload::Ping { sender, sender_addrs },
            RequestPayload::FindNode { sender_addrs, target, .. } => {
                RequestPayload::FindNode { sender, sender_addrs, target }
            }
            RequestPayload::FindValue { sender_addrs, key, .. } => {
                RequestPayload::FindValue { sender, sender_addrs, key }
            }
            RequestPayload::Store { sender_addrs, key, value, ttl_secs, .. } => {
                RequestPayload::Store { sender, sender_addrs, key, value, ttl_secs }
            }
            RequestPayload::AddProvider { sender_addrs, key, ttl_secs, .. } => {
                RequestPayload::AddProvider { sender, sender_addrs, key, ttl_secs }
            }
            RequestPayload::GetProviders { sender_addrs, key, .. } => {
                RequestPayload::GetProviders { sender, sender_addrs, key }
            }
            RequestPayload::RemoveProvider { sender_addrs, key, .. } => {
                RequestPayload::RemoveProvider { sender, sender_addrs, key }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: u64,
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    Ping {
        success: bool,
        local_id: NodeId,
        local_addrs: Vec<String>,
    },
    FindNode {
        success: bool,
        closer_peers: Vec<PeerInfo>,
    },
    FindValue {
        success: bool,
        value: Option<Vec<u8>>,
        closer_peers: Vec<PeerInfo>,
    },
    Store {
        success: bool,
        error: Option<String>,
    },
    AddProvider {
        success: bool,
        error: Option<String>,
    },
    GetProviders {
        success: bool,
        providers: Vec<ProviderInfo>,
        closer_peers: Vec<PeerInfo>,
    },
    RemoveProvider {
        success: bool,
        error: Option<String>,
    },
}

/// Encodes a message as `u32` big-endian length prefix + bincode payload.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = bincode::serialize(message).map_err(|e| DhtError::EncodingError {
        reason: e.to_string(),
    })?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(DhtError::EncodingError {
            reason: format!("frame of {} bytes exceeds {MAX_FRAME_SIZE}", body.len()),
        });
    }
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Decodes a length-prefixed frame's body (the prefix itself has already
/// been read by the transport), rejecting frames over `MAX_FRAME_SIZE`.
pub fn decode_frame<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(DhtError::EncodingError {
            reason: format!("frame of {} bytes exceeds {MAX_FRAME_SIZE}", body.len()),
        });
    }
    bincode::deserialize(body).map_err(|e| DhtError::EncodingError {
        reason: e.to_string(),
    })
}

pub fn read_length_prefix(prefix: [u8; 4]) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(DhtError::EncodingError {
            reason: format!("declared frame length {len} exceeds {MAX_FRAME_SIZE}"),
        });
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let req = Request {
            request_id: 42,
            payload: RequestPayload::Ping {
                sender: NodeId::from_bytes([1u8; 32]),
                sender_addrs: vec!["/ip4/1.2.3.4/udp/1/quic-v1".into()],
            },
        };
        let framed = encode_frame(&req).unwrap();
        let len = read_length_prefix(framed[0..4].try_into().unwrap()).unwrap();
        let decoded: Request = decode_frame(&framed[4..4 + len]).unwrap();
        assert_eq!(decoded.request_id, 42);
    }

    #[test]
    fn oversized_frame_rejected() {
        let huge = vec![0u8; MAX_FRAME_SIZE + 1];
        let result = decode_frame::<Request>(&huge);
        assert!(result.is_err());
    }
}
