//! Relay facade tying the registry, the store and the limiter together

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::rate_limit::RateLimiter;
use crate::registry::KeyRegistry;
use crate::storage::{EnvelopeStore, StoreStats};
use crate::sweeper::SweepReport;
use crate::types::{Envelope, EnvelopeId, EnvelopePayload, PublicKey, UserId};

/// Rate limit key used when a send carries no identity at all
const ANONYMOUS_RATE_KEY: &str = "anonymous";

/// Snapshot for the status endpoint
#[derive(Clone, Debug, Serialize)]
pub struct RelayStatus {
    /// Users with a registered key
    pub users_with_keys: usize,
    /// Envelopes currently held
    pub total_messages: usize,
    /// Envelope lifetime in minutes
    pub message_lifetime_minutes: u64,
    /// Payload bytes currently held
    pub stored_bytes: u64,
    /// Senders currently inside a rate window
    pub rate_windows: usize,
}

/// The relay core.
///
/// Owns every piece of shared state. Construct one per process (or per
/// test) and share it behind an `Arc`.
pub struct Relay {
    config: RelayConfig,
    registry: KeyRegistry,
    store: EnvelopeStore,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl Relay {
    /// Create a relay on the wall clock
    pub fn new(config: RelayConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a relay on a custom clock
    pub fn with_clock(config: RelayConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let ttl = to_chrono(config.message_ttl())?;
        let min_interval = to_chrono(config.rate_limit.min_send_interval())?;

        Ok(Self {
            registry: KeyRegistry::new(config.max_public_key_bytes),
            store: EnvelopeStore::new(ttl, config.max_store_bytes),
            limiter: RateLimiter::new(min_interval),
            config,
            clock,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Current time according to the injected clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register or replace a user's public key
    #[instrument(skip_all)]
    pub fn register_key(&self, user_id: &str, public_key: PublicKey) -> Result<()> {
        let id = UserId::parse(user_id)?;
        self.registry.register(id.clone(), public_key, self.now())?;
        info!("Public key registered for user {}...", id.short());
        Ok(())
    }

    /// Look up a user's public key.
    ///
    /// Identifiers that could never have been registered simply have no key.
    pub fn get_public_key(&self, user_id: &str) -> Option<PublicKey> {
        let id = UserId::parse(user_id).ok()?;
        self.registry.lookup(&id)
    }

    /// Accept an encrypted envelope for `recipient`.
    ///
    /// The rate limit applies to the sender when one is named, otherwise to
    /// `connection_key`. Checks run in order: input shape, payload size,
    /// rate limit, optional recipient check, store capacity.
    #[instrument(skip_all)]
    pub fn submit_envelope(
        &self,
        recipient: &str,
        sender: Option<&str>,
        payload: EnvelopePayload,
        connection_key: Option<&str>,
    ) -> Result<EnvelopeId> {
        let recipient = UserId::parse(recipient)?;
        let sender = sender.map(UserId::parse).transpose()?;
        payload.validate()?;

        let size = payload.size();
        if size > self.config.max_payload_bytes {
            return Err(RelayError::PayloadTooLarge {
                size,
                max: self.config.max_payload_bytes,
            });
        }

        let now = self.now();
        let rate_key = sender
            .as_ref()
            .map(UserId::as_str)
            .or(connection_key)
            .unwrap_or(ANONYMOUS_RATE_KEY);
        self.limiter.check_and_record(rate_key, now).into_result()?;

        if self.config.require_registered_recipient && !self.registry.contains(&recipient) {
            debug!("Recipient {} has no registered key", recipient.short());
            return Err(RelayError::NotFound);
        }

        let short_recipient = recipient.short().to_string();
        let id = self
            .store
            .submit(recipient, sender, payload, now)
            .map_err(|e| {
                warn!("Envelope rejected by store: {}", e);
                e
            })?;

        info!("Encrypted envelope stored for user {}...", short_recipient);
        Ok(id)
    }

    /// Pending envelopes for `recipient`, oldest first
    pub fn list_pending(&self, recipient: &str) -> Vec<Envelope> {
        match UserId::parse(recipient) {
            Ok(id) => self.store.list_pending(&id, self.now()),
            Err(_) => Vec::new(),
        }
    }

    /// Claim an envelope, destroying it
    #[instrument(skip_all)]
    pub fn mark_delivered(&self, envelope_id: &str, requester: &str) -> Result<Envelope> {
        if envelope_id.is_empty() {
            return Err(RelayError::invalid("message id is empty"));
        }
        let requester = UserId::parse(requester)?;
        let id = EnvelopeId::from_string(envelope_id);

        let envelope = self.store.mark_delivered(&id, &requester, self.now())?;
        info!("Envelope {}... read and destroyed", id.short());
        Ok(envelope)
    }

    /// Run one cleanup pass at the current time
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(self.now())
    }

    /// Run one cleanup pass at `now`.
    ///
    /// Each map is locked on its own, one after the other.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        SweepReport {
            envelopes: self.store.evict_expired(now),
            tombstones: self.store.purge_tombstones(now),
            rate_windows: self.limiter.evict_stale(now),
        }
    }

    /// Store statistics
    pub fn store_stats(&self) -> StoreStats {
        self.store.stats(self.now())
    }

    /// Status snapshot
    pub fn status(&self) -> RelayStatus {
        let stats = self.store_stats();
        RelayStatus {
            users_with_keys: self.registry.len(),
            total_messages: stats.envelope_count,
            message_lifetime_minutes: self.config.message_lifetime_minutes(),
            stored_bytes: stats.total_bytes,
            rate_windows: self.limiter.len(),
        }
    }
}

fn to_chrono(d: std::time::Duration) -> Result<Duration> {
    Duration::from_std(d).map_err(|e| RelayError::Config(e.to_string()))
}
