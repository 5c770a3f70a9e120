//! End-to-end behaviour of the relay core
//!
//! These tests drive the public `Relay` API with a manual clock, the way
//! the HTTP layer would.

use std::sync::Arc;

use chrono::Duration;
use safesender_relay::{
    EnvelopePayload, ManualClock, PublicKey, Relay, RelayConfig, RelayError, Sweeper,
};

fn payload(body: &str) -> EnvelopePayload {
    EnvelopePayload {
        ciphertext: body.as_bytes().to_vec(),
        wrapped_key: vec![0xAB; 256],
        iv: vec![0xCD; 12],
        algorithm: "RSA-OAEP+AES-GCM".to_string(),
    }
}

fn relay() -> (Arc<Relay>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let relay = Relay::with_clock(RelayConfig::default(), clock.clone()).unwrap();
    (Arc::new(relay), clock)
}

/// Register, send, list, read once, and find the message gone
#[test]
fn test_single_message_lifecycle() {
    let (relay, _) = relay();

    relay.register_key("U1", PublicKey::new(b"K1".to_vec())).unwrap();
    assert_eq!(relay.get_public_key("U1"), Some(PublicKey::new(b"K1".to_vec())));

    let id = relay
        .submit_envelope("U1", Some("U2"), payload("P"), None)
        .unwrap();

    let pending = relay.list_pending("U1");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].payload, payload("P"));
    assert_eq!(pending[0].sender.as_ref().map(|s| s.as_str()), Some("U2"));

    relay.mark_delivered(id.as_str(), "U1").unwrap();
    assert!(relay.list_pending("U1").is_empty());

    let again = relay.mark_delivered(id.as_str(), "U1").unwrap_err();
    assert!(again.is_gone());
}

#[test]
fn test_registry_overwrite() {
    let (relay, _) = relay();

    relay.register_key("U1", PublicKey::new(b"first".to_vec())).unwrap();
    relay.register_key("U1", PublicKey::new(b"second".to_vec())).unwrap();

    assert_eq!(relay.get_public_key("U1"), Some(PublicKey::new(b"second".to_vec())));
    assert_eq!(relay.get_public_key("never-registered"), None);
    assert_eq!(relay.status().users_with_keys, 1);
}

#[test]
fn test_submission_order() {
    let (relay, clock) = relay();

    let mut sent = Vec::new();
    for (sender, body) in [("a", "A"), ("b", "B"), ("c", "C")] {
        sent.push(relay.submit_envelope("U1", Some(sender), payload(body), None).unwrap());
        clock.advance(Duration::milliseconds(1));
    }

    let listed: Vec<_> = relay.list_pending("U1").into_iter().map(|e| e.id).collect();
    assert_eq!(listed, sent);
}

#[test]
fn test_ttl_eviction() {
    let (relay, clock) = relay();
    let id = relay.submit_envelope("U1", None, payload("P"), None).unwrap();

    clock.advance(Duration::minutes(10) - Duration::milliseconds(1));
    assert_eq!(relay.list_pending("U1").len(), 1);

    clock.advance(Duration::milliseconds(1));
    assert!(relay.list_pending("U1").is_empty());
    assert_eq!(relay.sweep().envelopes, 1);
    assert_eq!(
        relay.mark_delivered(id.as_str(), "U1").unwrap_err(),
        RelayError::NotFound
    );
}

#[test]
fn test_rate_limit_boundary() {
    let (relay, clock) = relay();

    relay.submit_envelope("U1", Some("S"), payload("1"), None).unwrap();

    clock.advance(Duration::seconds(5) - Duration::milliseconds(200));
    let err = relay
        .submit_envelope("U1", Some("S"), payload("2"), None)
        .unwrap_err();
    assert_eq!(err, RelayError::RateLimited { retry_after_secs: 1 });

    clock.advance(Duration::milliseconds(400));
    assert!(relay.submit_envelope("U1", Some("S"), payload("3"), None).is_ok());
}

#[test]
fn test_payload_ceiling_is_inclusive() {
    let config = RelayConfig {
        max_payload_bytes: 1024,
        rate_limit: safesender_relay::RateLimitConfig {
            min_send_interval_secs: 0,
        },
        ..Default::default()
    };
    let relay = Relay::with_clock(config, Arc::new(ManualClock::default())).unwrap();

    let mut at_limit = payload("");
    at_limit.ciphertext = vec![1; 1024 - at_limit.size()];
    assert_eq!(at_limit.size(), 1024);
    assert!(relay.submit_envelope("U1", None, at_limit.clone(), None).is_ok());

    let mut over = at_limit;
    over.ciphertext.push(1);
    assert_eq!(
        relay.submit_envelope("U1", None, over, None).unwrap_err(),
        RelayError::PayloadTooLarge { size: 1025, max: 1024 }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_deliver_once() {
    let (relay, _) = relay();
    let id = relay.submit_envelope("U1", None, payload("once"), None).unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let relay = relay.clone();
            let id = id.clone();
            tokio::spawn(async move { relay.mark_delivered(id.as_str(), "U1") })
        })
        .collect();

    let mut delivered = 0;
    let mut gone = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(envelope) => {
                assert_eq!(envelope.payload.ciphertext, b"once".to_vec());
                delivered += 1;
            }
            Err(e) if e.is_gone() => gone += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(delivered, 1);
    assert_eq!(gone, 31);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_from_one_sender() {
    let (relay, _) = relay();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let relay = relay.clone();
            tokio::spawn(async move {
                relay.submit_envelope("U1", Some("tabs"), payload(&format!("m{i}")), None)
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(RelayError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 5),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(relay.list_pending("U1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_sweeper_reclaims_memory() {
    let (relay, clock) = relay();
    for i in 0..5 {
        relay
            .submit_envelope("U1", None, payload("x"), Some(&format!("conn-{i}")))
            .unwrap();
    }
    assert_eq!(relay.status().total_messages, 5);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = Sweeper::new(relay.clone()).spawn(shutdown_rx);

    clock.advance(Duration::minutes(10));
    tokio::time::sleep(std::time::Duration::from_secs(61)).await;

    let status = relay.status();
    assert_eq!(status.total_messages, 0);
    assert_eq!(status.stored_bytes, 0);
    assert_eq!(status.rate_windows, 0);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}
