//! Background expiration sweeper

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::relay::Relay;

/// What a single sweep pass removed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired envelopes evicted
    pub envelopes: usize,
    /// Delivery records forgotten
    pub tombstones: usize,
    /// Rate windows dropped
    pub rate_windows: usize,
}

impl SweepReport {
    /// Whether the pass removed nothing
    pub fn is_empty(&self) -> bool {
        self.envelopes == 0 && self.tombstones == 0 && self.rate_windows == 0
    }
}

/// Periodic cleanup task bound to a shutdown signal
pub struct Sweeper {
    relay: Arc<Relay>,
    interval: Duration,
}

impl Sweeper {
    /// Create a sweeper using the relay's configured interval
    pub fn new(relay: Arc<Relay>) -> Self {
        let interval = relay.config().sweep_interval();
        Self::with_interval(relay, interval)
    }

    /// Create a sweeper with an explicit interval
    pub fn with_interval(relay: Arc<Relay>, interval: Duration) -> Self {
        Self { relay, interval }
    }

    /// Run one pass, containing any panic
    pub fn run_once(&self) -> Option<SweepReport> {
        guarded(|| self.relay.sweep())
    }

    /// Sweep every interval until `shutdown` turns true or its sender drops
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Sweeper started, interval {:?}", self.interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Some(report) = self.run_once() {
                        if !report.is_empty() {
                            info!(
                                envelopes = report.envelopes,
                                tombstones = report.tombstones,
                                rate_windows = report.rate_windows,
                                "Sweep removed expired entries"
                            );
                        } else {
                            debug!("Sweep found nothing to remove");
                        }
                    }
                }
            }
        }

        info!("Sweeper stopped");
    }

    /// Spawn the loop onto the current runtime
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

fn guarded<F>(pass: F) -> Option<SweepReport>
where
    F: FnOnce() -> SweepReport,
{
    match panic::catch_unwind(AssertUnwindSafe(pass)) {
        Ok(report) => Some(report),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Sweep pass panicked, continuing: {}", reason);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RelayConfig;
    use crate::types::EnvelopePayload;

    fn payload() -> EnvelopePayload {
        EnvelopePayload {
            ciphertext: vec![1; 16],
            wrapped_key: vec![2; 8],
            iv: vec![3; 12],
            algorithm: "RSA-OAEP+AES-GCM".to_string(),
        }
    }

    fn relay() -> (Arc<Relay>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let relay = Relay::with_clock(RelayConfig::default(), clock.clone()).unwrap();
        (Arc::new(relay), clock)
    }

    #[test]
    fn test_panic_is_contained() {
        let result = guarded(|| panic!("boom"));
        assert!(result.is_none());

        let ok = guarded(SweepReport::default);
        assert_eq!(ok, Some(SweepReport::default()));
    }

    #[test]
    fn test_run_once() {
        let (relay, clock) = relay();
        relay.submit_envelope("bob", None, payload(), None).unwrap();

        let sweeper = Sweeper::new(relay.clone());
        assert_eq!(sweeper.run_once().unwrap().envelopes, 0);

        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(sweeper.run_once().unwrap().envelopes, 1);
        assert_eq!(relay.store_stats().envelope_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_sweeps_and_stops() {
        let (relay, clock) = relay();
        relay.submit_envelope("bob", None, payload(), None).unwrap();
        clock.advance(chrono::Duration::minutes(11));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Sweeper::with_interval(relay.clone(), Duration::from_secs(60))
            .spawn(shutdown_rx);

        // nothing happens before the first interval
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(relay.store_stats().envelope_count, 1);

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(relay.store_stats().envelope_count, 0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_when_sender_dropped() {
        let (relay, _) = relay();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Sweeper::new(relay).spawn(shutdown_rx);

        drop(shutdown_tx);
        handle.await.unwrap();
    }
}
