//! # SafeSender Relay
//!
//! Blind relay core for anonymous end-to-end encrypted messaging. Clients
//! register a public key under a random identifier and exchange envelopes
//! the relay cannot read. The relay holds each envelope until its recipient
//! fetches it once, or until its time-to-live runs out.
//!
//! ## Features
//!
//! - **Key Registry**: last-writer-wins public key directory
//! - **Single-Read Envelopes**: delivery removes the envelope atomically
//! - **Time-Based Expiry**: background sweeper evicts stale envelopes
//! - **Send Throttling**: minimum gap between sends per sender
//! - **Memory Only**: nothing survives a restart

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod clock;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod registry;
pub mod relay;
pub mod storage;
pub mod sweeper;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RateLimitConfig, RelayConfig};
pub use error::{RelayError, Result};
pub use rate_limit::{RateDecision, RateLimiter};
pub use registry::KeyRegistry;
pub use relay::{Relay, RelayStatus};
pub use storage::{EnvelopeStore, StoreStats};
pub use sweeper::{SweepReport, Sweeper};
pub use types::{Envelope, EnvelopeId, EnvelopePayload, PublicKey, UserId, UserRecord};

/// Default envelope time-to-live in seconds (10 minutes)
pub const DEFAULT_MESSAGE_TTL_SECS: u64 = 10 * 60;

/// Default sweeper interval in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default minimum gap between accepted sends from one key, in seconds
pub const DEFAULT_MIN_SEND_INTERVAL_SECS: u64 = 5;

/// Maximum envelope payload size (64 KB)
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Maximum public key size (16 KB)
pub const MAX_PUBLIC_KEY_SIZE: usize = 16 * 1024;

/// Default ceiling on payload bytes held by the store (64 MB)
pub const DEFAULT_MAX_STORE_BYTES: u64 = 64 * 1024 * 1024;

/// Maximum length of a user identifier
pub const MAX_USER_ID_LEN: usize = 128;
