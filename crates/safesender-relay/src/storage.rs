//! Ephemeral envelope storage with single-read delivery

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::error::{RelayError, Result};
use crate::types::{Envelope, EnvelopeId, EnvelopePayload, UserId};

/// Storage statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Envelopes currently held
    pub envelope_count: usize,
    /// Payload bytes currently held
    pub total_bytes: u64,
    /// Recipients with at least one envelope
    pub recipient_count: usize,
    /// Envelopes past their TTL but not yet swept
    pub expired_count: usize,
}

struct StoredEnvelope {
    envelope: Envelope,
    seq: u64,
}

impl StoredEnvelope {
    fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.envelope.created_at, self.seq)
    }
}

#[derive(Default)]
struct Inner {
    envelopes: HashMap<EnvelopeId, StoredEnvelope>,
    /// Per-recipient index in submission order
    by_recipient: HashMap<UserId, BTreeMap<(DateTime<Utc>, u64), EnvelopeId>>,
    /// Delivered ids and when they were delivered; no payload is kept
    tombstones: HashMap<EnvelopeId, DateTime<Utc>>,
    next_seq: u64,
    total_bytes: u64,
}

impl Inner {
    fn remove(&mut self, id: &EnvelopeId) -> Option<Envelope> {
        let stored = self.envelopes.remove(id)?;
        let recipient = &stored.envelope.recipient;
        if let Some(index) = self.by_recipient.get_mut(recipient) {
            index.remove(&stored.order_key());
            if index.is_empty() {
                self.by_recipient.remove(recipient);
            }
        }
        self.total_bytes -= stored.envelope.payload.size() as u64;
        Some(stored.envelope)
    }

    fn fresh_id(&self) -> EnvelopeId {
        loop {
            let id = EnvelopeId::new();
            if !self.envelopes.contains_key(&id) && !self.tombstones.contains_key(&id) {
                return id;
            }
        }
    }
}

/// In-memory envelope store.
///
/// All state sits behind one lock. Delivery checks and removal happen in
/// the same write section, so an envelope can be handed out at most once.
pub struct EnvelopeStore {
    inner: RwLock<Inner>,
    ttl: Duration,
    max_bytes: u64,
}

impl EnvelopeStore {
    /// Create a store with the given TTL and byte ceiling
    pub fn new(ttl: Duration, max_bytes: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            ttl,
            max_bytes,
        }
    }

    /// Envelope time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - created_at >= self.ttl
    }

    /// Store a new envelope and return its identifier
    pub fn submit(
        &self,
        recipient: UserId,
        sender: Option<UserId>,
        payload: EnvelopePayload,
        now: DateTime<Utc>,
    ) -> Result<EnvelopeId> {
        let size = payload.size();
        let mut inner = self.inner.write();

        let available = self.max_bytes.saturating_sub(inner.total_bytes);
        if size as u64 > available {
            return Err(RelayError::StoreFull { size, available });
        }

        let id = inner.fresh_id();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        debug!("Storing envelope {} for {}: {} bytes", id.short(), recipient.short(), size);

        inner
            .by_recipient
            .entry(recipient.clone())
            .or_default()
            .insert((now, seq), id.clone());
        inner.total_bytes += size as u64;
        inner.envelopes.insert(
            id.clone(),
            StoredEnvelope {
                envelope: Envelope {
                    id: id.clone(),
                    recipient,
                    sender,
                    payload,
                    created_at: now,
                },
                seq,
            },
        );

        Ok(id)
    }

    /// Undelivered, unexpired envelopes for `recipient`, oldest first.
    ///
    /// Listing is non-destructive.
    pub fn list_pending(&self, recipient: &UserId, now: DateTime<Utc>) -> Vec<Envelope> {
        let inner = self.inner.read();
        let Some(index) = inner.by_recipient.get(recipient) else {
            return Vec::new();
        };

        index
            .values()
            .filter_map(|id| inner.envelopes.get(id))
            .filter(|stored| !self.is_expired(stored.envelope.created_at, now))
            .map(|stored| stored.envelope.clone())
            .collect()
    }

    /// Hand out an envelope and remove it from the store.
    ///
    /// Only the recipient may claim an envelope; any other requester sees
    /// `NotFound` and the envelope stays put. Expired envelopes are
    /// dropped on contact.
    pub fn mark_delivered(
        &self,
        id: &EnvelopeId,
        requester: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Envelope> {
        let mut inner = self.inner.write();

        let (recipient_matches, expired) = match inner.envelopes.get(id) {
            Some(stored) => (
                &stored.envelope.recipient == requester,
                self.is_expired(stored.envelope.created_at, now),
            ),
            None if inner.tombstones.contains_key(id) => {
                return Err(RelayError::AlreadyDelivered);
            }
            None => return Err(RelayError::NotFound),
        };

        if expired {
            inner.remove(id);
            debug!("Envelope {} expired before delivery", id.short());
            return Err(RelayError::NotFound);
        }
        if !recipient_matches {
            return Err(RelayError::NotFound);
        }

        let envelope = inner.remove(id).ok_or(RelayError::NotFound)?;
        inner.tombstones.insert(id.clone(), now);
        debug!("Envelope {} delivered and destroyed", id.short());
        Ok(envelope)
    }

    /// Remove every envelope whose TTL has elapsed, delivered or not
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write();

        let expired: Vec<EnvelopeId> = inner
            .envelopes
            .iter()
            .filter(|(_, stored)| self.is_expired(stored.envelope.created_at, now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            inner.remove(id);
        }

        if !expired.is_empty() {
            info!("Evicted {} expired envelopes", expired.len());
        }
        expired.len()
    }

    /// Forget delivery records older than one TTL
    pub fn purge_tombstones(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write();
        let before = inner.tombstones.len();
        let ttl = self.ttl;
        inner.tombstones.retain(|_, delivered_at| now - *delivered_at < ttl);
        before - inner.tombstones.len()
    }

    /// Number of envelopes held
    pub fn len(&self) -> usize {
        self.inner.read().envelopes.len()
    }

    /// Whether the store holds no envelopes
    pub fn is_empty(&self) -> bool {
        self.inner.read().envelopes.is_empty()
    }

    /// Get storage statistics
    pub fn stats(&self, now: DateTime<Utc>) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            envelope_count: inner.envelopes.len(),
            total_bytes: inner.total_bytes,
            recipient_count: inner.by_recipient.len(),
            expired_count: inner
                .envelopes
                .values()
                .filter(|s| self.is_expired(s.envelope.created_at, now))
                .count(),
        }
    }
}
