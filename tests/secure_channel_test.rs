// ABOUTME: Secure channel tests over the in-process loopback transport
// ABOUTME: Handshakes, signed and encrypted delivery, replay and tamper rejection, retries and timeouts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use a2a_trust_fabric::a2a::{
    ChannelCredentials, ChannelError, ChannelParts, ConnectionState, HealthCheck,
    LoopbackTransport, MessagePayload, MessageResponse, MessageTransport, OutboundMessage,
    PaymentRequest, SecureChannel, SecurityLevel, SendOptions,
};
use a2a_trust_fabric::clock::ManualClock;
use a2a_trust_fabric::crypto::EnvelopeKeys;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;
use url::Url;

fn payment() -> MessagePayload {
    MessagePayload::PaymentRequest(PaymentRequest {
        amount: 1000,
        currency: "THB".into(),
        description: Some("Invoice 42".into()),
        reference: Some("inv-42".into()),
        metadata: None,
    })
}

fn keys() -> EnvelopeKeys {
    EnvelopeKeys::from_secrets(common::SIGNING_SECRET, common::ENCRYPTION_SECRET)
}

struct Pair {
    clock: ManualClock,
    a: Arc<SecureChannel>,
    b: Arc<SecureChannel>,
}

fn standard_pair() -> Pair {
    common::init_test_logging();
    let clock = ManualClock::starting_now();
    let transport = Arc::new(LoopbackTransport::new());
    let a = common::channel("agent-a", &clock, &transport, None);
    let b = common::channel("agent-b", &clock, &transport, None);
    Pair { clock, a, b }
}

#[tokio::test]
async fn test_standard_handshake_and_delivery() {
    let Pair { a, b: _b, .. } = standard_pair();

    let status = a
        .initialize_connection("agent-b", SecurityLevel::Standard, None)
        .await
        .unwrap();
    assert_eq!(status.state, ConnectionState::Established);
    assert_eq!(status.security_level, Some(SecurityLevel::Standard));
    assert!(status.is_active);
    assert!(!status.mutual_tls);

    let response = a
        .send_message("agent-b", &payment(), SendOptions::default())
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.message_type, "payment_request");
    assert!(!response.message_id.is_empty());
    let data = response.data.unwrap();
    assert_eq!(data["amount"], 1000);
    assert_eq!(data["currency"], "THB");

    let status = a.get_connection_status("agent-b").await.unwrap();
    assert_eq!(status.message_count, 1);
}

#[tokio::test]
async fn test_encrypted_delivery() {
    let Pair { a, b: _b, .. } = standard_pair();
    a.initialize_connection("agent-b", SecurityLevel::Standard, None)
        .await
        .unwrap();

    let envelope = a.build_envelope("agent-b", &payment(), true).unwrap();
    assert!(envelope.encrypted);
    let wire = envelope.payload.to_string();
    assert!(!wire.contains("THB"));
    assert!(!wire.contains("Invoice 42"));

    let response = a
        .send_message("agent-b", &payment(), SendOptions::encrypted())
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.data.unwrap()["currency"], "THB");
}

#[tokio::test]
async fn test_send_without_connection_fails() {
    let Pair { a, b: _b, .. } = standard_pair();

    let result = a
        .send_message("agent-b", &payment(), SendOptions::default())
        .await;
    assert!(matches!(result, Err(ChannelError::NoActiveConnection(peer)) if peer == "agent-b"));
}

#[tokio::test]
async fn test_replayed_envelope_rejected() {
    let Pair { a, b, .. } = standard_pair();

    let envelope = a.build_envelope("agent-b", &payment(), false).unwrap();
    assert!(b.receive_message(envelope.clone()).await.is_ok());

    let replayed = b.receive_message(envelope).await;
    assert!(matches!(replayed, Err(ChannelError::ReplayDetected { .. })));
}

#[tokio::test]
async fn test_stale_envelope_rejected() {
    let Pair { clock, a, b } = standard_pair();

    let envelope = a.build_envelope("agent-b", &payment(), false).unwrap();
    clock.advance(Duration::hours(25));

    let result = b.receive_message(envelope).await;
    assert!(matches!(result, Err(ChannelError::ReplayDetected { .. })));
}

#[tokio::test]
async fn test_tampered_envelope_rejected() {
    let Pair { a, b, .. } = standard_pair();

    let mut envelope = a.build_envelope("agent-b", &payment(), false).unwrap();
    envelope.payload = json!({ "amount": 999_999, "currency": "THB" });

    let result = b.receive_message(envelope).await;
    assert!(matches!(result, Err(ChannelError::InvalidSignature)));
}

#[tokio::test]
async fn test_signature_failure_does_not_consume_message_id() {
    let Pair { a, b, .. } = standard_pair();

    let original = a.build_envelope("agent-b", &payment(), false).unwrap();
    let mut forged = original.clone();
    forged.signature = "00".repeat(32);

    assert!(matches!(
        b.receive_message(forged).await,
        Err(ChannelError::InvalidSignature)
    ));
    assert!(b.receive_message(original).await.is_ok());
}

#[tokio::test]
async fn test_undecryptable_payload_rejected() {
    let Pair { a, b, .. } = standard_pair();

    let mut envelope = a.build_envelope("agent-b", &payment(), true).unwrap();
    envelope.payload = json!({ "garbage": true });
    envelope.sign(&keys()).unwrap();

    let result = b.receive_message(envelope).await;
    assert!(matches!(result, Err(ChannelError::DecryptionFailed(_))));
}

#[tokio::test]
async fn test_unknown_message_type_rejected() {
    let Pair { a, b, .. } = standard_pair();

    let mut envelope = a.build_envelope("agent-b", &payment(), false).unwrap();
    envelope.message_type = "teleport".into();
    envelope.sign(&keys()).unwrap();

    let result = b.receive_message(envelope).await;
    assert!(matches!(result, Err(ChannelError::UnknownMessageType(kind)) if kind == "teleport"));
}

#[tokio::test]
async fn test_invalid_payload_rejected() {
    let Pair { a, b, .. } = standard_pair();

    let mut envelope = a.build_envelope("agent-b", &payment(), false).unwrap();
    envelope.payload = json!({ "amount": 0, "currency": "THB" });
    envelope.sign(&keys()).unwrap();

    let result = b.receive_message(envelope).await;
    assert!(matches!(result, Err(ChannelError::InvalidPayload(_))));
}

#[tokio::test]
async fn test_high_level_exchanges_certificates() {
    common::init_test_logging();
    let clock = ManualClock::starting_now();
    let transport = Arc::new(LoopbackTransport::new());
    let authority = common::authority(&clock).await;
    let a = common::channel("agent-a", &clock, &transport, Some(Arc::clone(&authority)));
    let _b = common::channel("agent-b", &clock, &transport, Some(Arc::clone(&authority)));

    let status = a
        .initialize_connection("agent-b", SecurityLevel::High, None)
        .await
        .unwrap();
    assert!(status.mutual_tls);
    assert_eq!(status.security_level, Some(SecurityLevel::High));

    let response = a
        .send_message("agent-b", &payment(), SendOptions::encrypted())
        .await
        .unwrap();
    assert!(response.success);
    assert!(authority.get_agent_certificate("agent-a").is_some());
    assert!(authority.get_agent_certificate("agent-b").is_some());
}

#[tokio::test]
async fn test_high_level_requires_authority() {
    let Pair { a, b: _b, .. } = standard_pair();

    let result = a
        .initialize_connection("agent-b", SecurityLevel::High, None)
        .await;
    assert!(matches!(result, Err(ChannelError::CertificatesDisabled)));
    assert!(a.get_connection_status("agent-b").await.is_none());
}

#[tokio::test]
async fn test_peer_from_other_authority_rejected() {
    common::init_test_logging();
    let clock = ManualClock::starting_now();
    let transport = Arc::new(LoopbackTransport::new());
    let a = common::channel("agent-a", &clock, &transport, Some(common::authority(&clock).await));
    let _b = common::channel("agent-b", &clock, &transport, Some(common::authority(&clock).await));

    let result = a
        .initialize_connection("agent-b", SecurityLevel::High, None)
        .await;
    assert!(matches!(result, Err(ChannelError::InvalidPeerCertificate(peer)) if peer == "agent-b"));
}

#[tokio::test]
async fn test_failed_handshake_keeps_previous_connection() {
    let Pair { a, b: _b, .. } = standard_pair();
    a.initialize_connection("agent-b", SecurityLevel::Standard, None)
        .await
        .unwrap();

    assert!(a
        .initialize_connection("agent-b", SecurityLevel::High, None)
        .await
        .is_err());

    let status = a.get_connection_status("agent-b").await.unwrap();
    assert_eq!(status.state, ConnectionState::Established);
    assert_eq!(status.security_level, Some(SecurityLevel::Standard));
    assert!(a
        .send_message("agent-b", &payment(), SendOptions::default())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_close_connection() {
    let Pair { a, b: _b, .. } = standard_pair();
    a.initialize_connection("agent-b", SecurityLevel::Basic, None)
        .await
        .unwrap();
    a.initialize_connection("agent-c", SecurityLevel::Basic, None)
        .await
        .unwrap();

    let peers: Vec<_> = a
        .list_connections()
        .await
        .into_iter()
        .map(|status| status.peer_id)
        .collect();
    assert_eq!(peers, vec!["agent-b", "agent-c"]);

    assert!(a.close_connection("agent-b").await);
    assert!(!a.close_connection("agent-b").await);
    assert!(matches!(
        a.send_message("agent-b", &payment(), SendOptions::default())
            .await,
        Err(ChannelError::NoActiveConnection(_))
    ));
    assert_eq!(a.list_connections().await.len(), 1);
}

#[tokio::test]
async fn test_unknown_peer_is_not_retried() {
    let Pair { a, b: _b, .. } = standard_pair();
    a.initialize_connection("agent-z", SecurityLevel::Standard, None)
        .await
        .unwrap();

    let result = a
        .send_message("agent-z", &payment(), SendOptions::default())
        .await;
    assert!(matches!(result, Err(ChannelError::UnknownPeer(peer)) if peer == "agent-z"));
    assert_eq!(
        a.get_connection_status("agent-z").await.unwrap().message_count,
        0
    );
}

#[tokio::test]
async fn test_peer_directory() {
    let Pair { a, b: _b, .. } = standard_pair();
    let url = Url::parse("https://agent-b.example").unwrap();

    assert!(a.peer_endpoint("agent-b").is_none());
    a.register_peer("agent-b", url.clone());
    assert_eq!(a.peer_endpoint("agent-b"), Some(url));
}

/// Transport whose deliveries never complete
#[derive(Default)]
struct StalledTransport {
    attempts: AtomicU32,
}

#[async_trait]
impl MessageTransport for StalledTransport {
    async fn deliver(&self, _message: &OutboundMessage) -> Result<MessageResponse, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(StdDuration::from_secs(3600)).await;
        Err(ChannelError::Transport("unreachable".into()))
    }

    async fn fetch_certificate(
        &self,
        peer_id: &str,
        _endpoint: Option<&Url>,
    ) -> Result<String, ChannelError> {
        Err(ChannelError::UnknownPeer(peer_id.to_owned()))
    }
}

#[tokio::test]
async fn test_delivery_timeout_is_retried_then_reported() {
    common::init_test_logging();
    let clock = ManualClock::starting_now();
    let tokens = common::token_service(&clock);
    let redirect_uri = "https://agent-a.example/a2a/callback".to_owned();
    let registration = tokens
        .register_client("agent-a", vec![redirect_uri.clone()], None, None)
        .unwrap();
    let stalled = Arc::new(StalledTransport::default());
    let transport: Arc<dyn MessageTransport> = Arc::clone(&stalled) as Arc<dyn MessageTransport>;

    let channel = SecureChannel::new(ChannelParts {
        credentials: ChannelCredentials {
            agent_id: "agent-a".into(),
            client_id: registration.client.client_id,
            client_secret: registration.client_secret,
            redirect_uri,
        },
        config: common::quick_channel_config(),
        tokens,
        authority: None,
        keys: keys(),
        transport,
        clock: clock.shared(),
    });
    channel
        .initialize_connection("agent-b", SecurityLevel::Standard, None)
        .await
        .unwrap();

    let options = SendOptions {
        timeout: Some(StdDuration::from_millis(50)),
        ..SendOptions::default()
    };
    let health = MessagePayload::HealthCheck(HealthCheck::default());
    let result = channel.send_message("agent-b", &health, options).await;

    assert!(matches!(
        result,
        Err(ChannelError::Timeout {
            operation: "delivery",
            after_ms: 50
        })
    ));
    // One attempt plus one retry
    assert_eq!(stalled.attempts.load(Ordering::SeqCst), 2);
}

/// Loopback delivery with certificate fetches that never complete
struct StalledCertificateTransport {
    loopback: Arc<LoopbackTransport>,
}

#[async_trait]
impl MessageTransport for StalledCertificateTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<MessageResponse, ChannelError> {
        self.loopback.deliver(message).await
    }

    async fn fetch_certificate(
        &self,
        _peer_id: &str,
        _endpoint: Option<&Url>,
    ) -> Result<String, ChannelError> {
        tokio::time::sleep(StdDuration::from_secs(3600)).await;
        Err(ChannelError::Transport("unreachable".into()))
    }
}

#[tokio::test]
async fn test_handshake_timeout_keeps_connection_and_revokes_token() {
    common::init_test_logging();
    let clock = ManualClock::starting_now();
    let authority = common::authority(&clock).await;
    let loopback = Arc::new(LoopbackTransport::new());
    let _b = common::channel("agent-b", &clock, &loopback, Some(Arc::clone(&authority)));

    let tokens = common::token_service(&clock);
    let redirect_uri = "https://agent-a.example/a2a/callback".to_owned();
    let registration = tokens
        .register_client("agent-a", vec![redirect_uri.clone()], None, None)
        .unwrap();
    let a = SecureChannel::new(ChannelParts {
        credentials: ChannelCredentials {
            agent_id: "agent-a".into(),
            client_id: registration.client.client_id,
            client_secret: registration.client_secret,
            redirect_uri,
        },
        config: common::quick_channel_config(),
        tokens: Arc::clone(&tokens),
        authority: Some(authority),
        keys: keys(),
        transport: Arc::new(StalledCertificateTransport { loopback }),
        clock: clock.shared(),
    });
    // Issue our own certificate up front so only the peer fetch can stall
    a.local_certificate().await.unwrap();
    a.initialize_connection("agent-b", SecurityLevel::Standard, None)
        .await
        .unwrap();
    assert_eq!(tokens.active_token_count(), 1);

    let upgrade = a
        .initialize_connection(
            "agent-b",
            SecurityLevel::High,
            Some(StdDuration::from_millis(200)),
        )
        .await;
    assert!(matches!(
        upgrade,
        Err(ChannelError::Timeout {
            operation: "handshake",
            after_ms: 200
        })
    ));
    assert_eq!(tokens.active_token_count(), 1);

    let status = a.get_connection_status("agent-b").await.unwrap();
    assert_eq!(status.state, ConnectionState::Established);
    assert_eq!(status.security_level, Some(SecurityLevel::Standard));
    let response = a
        .send_message("agent-b", &payment(), SendOptions::default())
        .await
        .unwrap();
    assert!(response.success);
}
