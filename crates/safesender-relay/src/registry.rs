//! Public key directory

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::types::{PublicKey, UserId, UserRecord};

/// Maps anonymous user identifiers to their current public key.
///
/// Entries live for the lifetime of the process. Re-registering an id
/// replaces the key in a single map insert, so readers see either the old
/// record or the new one.
pub struct KeyRegistry {
    users: DashMap<UserId, UserRecord>,
    max_key_size: usize,
}

impl KeyRegistry {
    /// Create an empty registry
    pub fn new(max_key_size: usize) -> Self {
        Self {
            users: DashMap::new(),
            max_key_size,
        }
    }

    /// Store or replace the public key for `id`
    pub fn register(&self, id: UserId, public_key: PublicKey, now: DateTime<Utc>) -> Result<()> {
        if public_key.is_empty() {
            return Err(RelayError::invalid("public key is empty"));
        }
        if public_key.len() > self.max_key_size {
            return Err(RelayError::invalid(format!(
                "public key exceeds {} bytes",
                self.max_key_size
            )));
        }

        debug!("Registering key for user {}", id.short());
        let record = UserRecord::new(id.clone(), public_key, now);
        self.users.insert(id, record);
        Ok(())
    }

    /// Current key for `id`, if one is registered
    pub fn lookup(&self, id: &UserId) -> Option<PublicKey> {
        self.users.get(id).map(|r| r.public_key.clone())
    }

    /// Whether `id` has a registered key
    pub fn contains(&self, id: &UserId) -> bool {
        self.users.contains_key(id)
    }

    /// Number of registered users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no user is registered
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
