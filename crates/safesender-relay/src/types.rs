//! Core types shared by the registry, the store and the API layer

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{RelayError, Result};

/// Anonymous user identifier, chosen by the client
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Parse and validate a client-supplied identifier
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(RelayError::invalid("user id is empty"));
        }
        if s.len() > crate::MAX_USER_ID_LEN {
            return Err(RelayError::invalid(format!(
                "user id longer than {} characters",
                crate::MAX_USER_ID_LEN
            )));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(RelayError::invalid("user id contains invalid characters"));
        }
        Ok(Self(s))
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines
    pub fn short(&self) -> &str {
        short(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = RelayError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for UserId {
    type Error = RelayError;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Relay-assigned envelope identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvelopeId(String);

impl EnvelopeId {
    /// Create a new random envelope ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an identifier received from a client
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines
    pub fn short(&self) -> &str {
        short(&self.0)
    }
}

impl Default for EnvelopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn short(s: &str) -> &str {
    // ids are ASCII once validated; fall back to the whole string otherwise
    s.get(..8).unwrap_or(s)
}

/// Public key material, opaque to the relay
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Wrap raw key bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no key material is present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bytes)", self.0.len())
    }
}

/// Registered user
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    /// User identifier
    pub id: UserId,
    /// Current public key
    pub public_key: PublicKey,
    /// Registration time, truncated to the minute
    pub registered_at: DateTime<Utc>,
}

impl UserRecord {
    /// Create a record, coarsening the registration time
    pub fn new(id: UserId, public_key: PublicKey, now: DateTime<Utc>) -> Self {
        let registered_at = now
            .duration_trunc(Duration::minutes(1))
            .unwrap_or(now);
        Self {
            id,
            public_key,
            registered_at,
        }
    }
}

/// Client-built hybrid encryption envelope contents
///
/// The relay never interprets these fields; it only checks that the
/// ciphertext and algorithm tag are present and measures the total size.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopePayload {
    /// Symmetrically encrypted message body
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    /// Symmetric key wrapped with the recipient's public key
    #[serde(with = "b64")]
    pub wrapped_key: Vec<u8>,
    /// Initialization vector for the symmetric cipher
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    /// Algorithm identifier, e.g. `RSA-OAEP+AES-GCM`
    pub algorithm: String,
}

impl EnvelopePayload {
    /// Total bytes counted against size limits
    pub fn size(&self) -> usize {
        self.ciphertext.len() + self.wrapped_key.len() + self.iv.len() + self.algorithm.len()
    }

    /// Check the fields the relay requires
    pub fn validate(&self) -> Result<()> {
        if self.ciphertext.is_empty() {
            return Err(RelayError::invalid("payload ciphertext is empty"));
        }
        if self.algorithm.trim().is_empty() {
            return Err(RelayError::invalid("payload algorithm is empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for EnvelopePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopePayload")
            .field("size", &self.size())
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Stored encrypted message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope identifier
    pub id: EnvelopeId,
    /// Recipient
    pub recipient: UserId,
    /// Optional sender, informational only
    pub sender: Option<UserId>,
    /// Opaque encrypted contents
    pub payload: EnvelopePayload,
    /// Submission time
    pub created_at: DateTime<Utc>,
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
