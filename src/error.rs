// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

#![allow(clippy::enum_variant_names)]

use thiserror::Error;

pub type Result<T, E = DhtError> = std::result::Result<T, E>;

/// Every error kind a caller of this crate can observe.
#[derive(Debug, Error)]
pub enum DhtError {
    #[error("DHT is not running")]
    NotRunning,

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("routing table is empty")]
    NoNodes,

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("seqno rollback: incoming record is not newer than the stored one")]
    SeqnoRollback,

    #[error("sender {sender} exceeded the rate limit for {action}")]
    RateLimited { sender: String, action: String },

    #[error("sender identity mismatch: declared {declared}, authenticated {authenticated}")]
    SenderMismatch {
        declared: String,
        authenticated: String,
    },

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("identity error: {reason}")]
    IdentityError { reason: String },

    #[error("transport error: {reason}")]
    TransportError { reason: String },

    #[error("encoding error: {reason}")]
    EncodingError { reason: String },
}

impl DhtError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        DhtError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn validation_failed(reason: impl Into<String>) -> Self {
        DhtError::ValidationFailed {
            reason: reason.into(),
        }
    }
}
