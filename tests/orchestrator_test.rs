// ABOUTME: End-to-end tests of the authentication orchestrator with two agents on one loopback
// ABOUTME: Registration, authentication policy, channels, messaging, sessions, rate limits and metrics
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use a2a_trust_core::ErrorCode;
use a2a_trust_fabric::a2a::{
    LoopbackTransport, MessagePayload, PaymentRequest, SecurityLevel, SendOptions,
};
use a2a_trust_fabric::clock::ManualClock;
use a2a_trust_fabric::orchestrator::{
    AgentRegistration, AuthOrchestrator, InboundHeaders, RegistrationResult, RequestContext,
    ADMIN_SCOPE_REQUIRED_MESSAGE, MTLS_REQUIRED_MESSAGE,
};
use a2a_trust_fabric::security::{AuditAction, SecurityEventKind};
use chrono::Duration;
use tempfile::TempDir;

fn agent_a_registration(scopes: &[&str]) -> AgentRegistration {
    AgentRegistration {
        name: "Agent A".into(),
        redirect_uris: vec!["https://a.example/callback".into()],
        scopes: Some(scopes.iter().map(|s| (*s).to_owned()).collect()),
        ..AgentRegistration::default()
    }
}

fn payment() -> MessagePayload {
    MessagePayload::PaymentRequest(PaymentRequest {
        amount: 1000,
        currency: "THB".into(),
        description: None,
        reference: None,
        metadata: None,
    })
}

async fn register(orchestrator: &AuthOrchestrator, scopes: &[&str]) -> RegistrationResult {
    orchestrator
        .register_agent(agent_a_registration(scopes))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_register_authenticate_establish_and_send() {
    common::init_test_logging();
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;

    let registration = register(&a, &["read", "write"]).await;
    assert_eq!(registration.scopes, vec!["read", "write"]);
    assert!(registration.certificate.is_none());
    assert_eq!(
        registration.endpoints.token_endpoint,
        "https://agent-a.example/oauth/token"
    );

    let outcome = a.authenticate_agent(
        &registration.client_id,
        &registration.client_secret,
        SecurityLevel::Standard,
        &RequestContext::default(),
    );
    assert!(outcome.success, "{:?}", outcome.error);
    assert!(outcome.session_id.is_some());
    assert_eq!(
        outcome.identity.as_ref().map(|identity| identity.client_id.as_str()),
        Some(registration.client_id.as_str())
    );

    let channel = a
        .establish_secure_channel("agent-b", SecurityLevel::Standard)
        .await
        .unwrap();
    assert!(channel.health.healthy, "{:?}", channel.health.error);
    assert!(channel.connection.is_active);

    let response = a
        .send_secure_message("agent-b", &payment(), SendOptions::default())
        .await
        .unwrap();
    assert!(response.success);
    assert!(!response.message_id.is_empty());
    assert_eq!(response.message_type, "payment_request");

    let actions: Vec<_> = a
        .audit_log()
        .entries()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    for action in [
        AuditAction::RegisterAgent,
        AuditAction::Authenticate,
        AuditAction::EstablishChannel,
        AuditAction::HealthCheck,
        AuditAction::SendMessage,
    ] {
        assert!(actions.contains(&action), "missing {action}");
    }
}

#[tokio::test]
async fn test_registration_issues_certificate_when_enabled() {
    let clock = ManualClock::starting_now();
    let transport = Arc::new(LoopbackTransport::new());
    let a = common::orchestrator(common::fabric_config("agent-a", true), &clock, &transport).await;

    let mut request = agent_a_registration(&["read"]);
    request.agent_id = Some("payments-agent".into());
    let registration = a.register_agent(request).await.unwrap();

    let certificate = registration.certificate.unwrap();
    assert_eq!(certificate.agent_id, "payments-agent");
    assert_eq!(registration.agent_id, "payments-agent");
    let authority = a.certificate_authority().unwrap();
    assert!(authority.validate_agent_certificate(&certificate.certificate_pem, "payments-agent"));
}

#[tokio::test]
async fn test_invalid_registration_rejected_and_audited() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;

    let mut request = agent_a_registration(&["read"]);
    request.redirect_uris = vec!["ftp://a.example/callback".into()];
    let error = a.register_agent(request).await.unwrap_err();
    assert_eq!(error.code, ErrorCode::ValidationFailed);
    assert_eq!(error.details.unwrap()["field"], "redirect_uris");

    let error = a
        .register_agent(agent_a_registration(&["superuser"]))
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ValidationFailed);

    let failures = a
        .audit_log()
        .entries()
        .into_iter()
        .filter(|entry| entry.action == AuditAction::RegisterAgent && !entry.success)
        .count();
    assert_eq!(failures, 2);
}

#[tokio::test]
async fn test_bad_credentials_fail_authentication() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;
    let registration = register(&a, &["read", "write"]).await;

    let outcome = a.authenticate_agent(
        &registration.client_id,
        "wrong-secret",
        SecurityLevel::Standard,
        &RequestContext::default(),
    );
    assert!(!outcome.success);
    assert!(outcome.tokens.is_none());
    assert_eq!(outcome.error.unwrap().code, ErrorCode::AuthInvalid);

    let outcome = a.authenticate_agent(
        "a2a_unknown",
        &registration.client_secret,
        SecurityLevel::Basic,
        &RequestContext::default(),
    );
    assert_eq!(outcome.error.unwrap().code, ErrorCode::AuthInvalid);
}

#[tokio::test]
async fn test_high_level_without_certificates_is_policy_violation() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;
    let registration = register(&a, &["read", "write", "admin"]).await;

    let outcome = a.authenticate_agent(
        &registration.client_id,
        &registration.client_secret,
        SecurityLevel::High,
        &RequestContext::default(),
    );
    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert_eq!(error.code, ErrorCode::PolicyViolation);
    assert_eq!(error.message, MTLS_REQUIRED_MESSAGE);
    assert_eq!(error.message, "mTLS is required for high security level");

    let error = a
        .establish_secure_channel("agent-b", SecurityLevel::High)
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::PolicyViolation);
    assert_eq!(error.message, MTLS_REQUIRED_MESSAGE);
}

#[tokio::test]
async fn test_high_level_requires_admin_scope() {
    let clock = ManualClock::starting_now();
    let transport = Arc::new(LoopbackTransport::new());
    let a = common::orchestrator(common::fabric_config("agent-a", true), &clock, &transport).await;

    let limited = register(&a, &["read", "write"]).await;
    let outcome = a.authenticate_agent(
        &limited.client_id,
        &limited.client_secret,
        SecurityLevel::High,
        &RequestContext::default(),
    );
    let error = outcome.error.unwrap();
    assert_eq!(error.code, ErrorCode::PermissionDenied);
    assert_eq!(error.message, ADMIN_SCOPE_REQUIRED_MESSAGE);

    let admin = register(&a, &["read", "write", "admin"]).await;
    let outcome = a.authenticate_agent(
        &admin.client_id,
        &admin.client_secret,
        SecurityLevel::High,
        &RequestContext::default(),
    );
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.security_level, SecurityLevel::High);
}

#[tokio::test]
async fn test_high_level_channel_with_shared_root() {
    common::init_test_logging();
    let clock = ManualClock::starting_now();
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(LoopbackTransport::new());

    let mut config_a = common::fabric_config("agent-a", true);
    config_a.certificates = common::fast_ca_config(Some(dir.path().to_path_buf()));
    let a = common::orchestrator(config_a, &clock, &transport).await;

    let mut config_b = common::fabric_config("agent-b", true);
    config_b.certificates = common::fast_ca_config(Some(dir.path().to_path_buf()));
    let _b = common::orchestrator(config_b, &clock, &transport).await;

    let channel = a
        .establish_secure_channel("agent-b", SecurityLevel::High)
        .await
        .unwrap();
    assert!(channel.connection.mutual_tls);
    assert!(channel.health.healthy, "{:?}", channel.health.error);

    let response = a
        .send_secure_message("agent-b", &payment(), SendOptions::default())
        .await
        .unwrap();
    assert!(response.success);
}

#[tokio::test]
async fn test_send_without_channel_fails() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;

    let error = a
        .send_secure_message("agent-b", &payment(), SendOptions::default())
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::NoActiveConnection);

    let last = a.audit_log().recent(1).pop().unwrap();
    assert_eq!(last.action, AuditAction::SendMessage);
    assert!(!last.success);
}

#[tokio::test]
async fn test_health_check_reports_unreachable_peer() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;

    let result = a.perform_health_check("agent-b").await;
    assert!(!result.healthy);
    assert!(result.error.is_some());
    assert_eq!(result.peer_id, "agent-b");
}

#[tokio::test]
async fn test_rate_limit_blocks_101st_attempt_until_window_resets() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;
    let registration = register(&a, &["read", "write"]).await;
    let authenticate = || {
        a.authenticate_agent(
            &registration.client_id,
            &registration.client_secret,
            SecurityLevel::Standard,
            &RequestContext::default(),
        )
    };

    for attempt in 1..=100 {
        assert!(authenticate().success, "attempt {attempt} should pass");
    }

    let blocked = authenticate();
    assert!(!blocked.success);
    let error = blocked.error.unwrap();
    assert_eq!(error.code, ErrorCode::RateLimitExceeded);
    assert!(error.details.unwrap().get("reset_at").is_some());

    clock.advance(Duration::seconds(61));
    assert!(authenticate().success);
}

#[tokio::test]
async fn test_allow_lists_checked_before_exchange() {
    let clock = ManualClock::starting_now();
    let transport = Arc::new(LoopbackTransport::new());
    let mut config = common::fabric_config("agent-a", false);
    config.security.allowed_ips = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
    config.security.allowed_user_agents = vec!["trusted-agent".into()];
    let a = common::orchestrator(config, &clock, &transport).await;
    let registration = register(&a, &["read"]).await;

    let outsider = RequestContext {
        ip_address: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))),
        user_agent: Some("trusted-agent/1.0".into()),
    };
    let outcome = a.authenticate_agent(
        &registration.client_id,
        &registration.client_secret,
        SecurityLevel::Standard,
        &outsider,
    );
    assert_eq!(outcome.error.unwrap().code, ErrorCode::PermissionDenied);

    let wrong_agent = RequestContext {
        ip_address: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        user_agent: Some("curl/8.0".into()),
    };
    let outcome = a.authenticate_agent(
        &registration.client_id,
        &registration.client_secret,
        SecurityLevel::Standard,
        &wrong_agent,
    );
    assert_eq!(outcome.error.unwrap().code, ErrorCode::PermissionDenied);

    let insider = RequestContext {
        ip_address: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        user_agent: Some("trusted-agent/1.0".into()),
    };
    let outcome = a.authenticate_agent(
        &registration.client_id,
        &registration.client_secret,
        SecurityLevel::Standard,
        &insider,
    );
    assert!(outcome.success, "{:?}", outcome.error);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;
    let registration = register(&a, &["read", "write"]).await;

    let first = a
        .authenticate_agent(
            &registration.client_id,
            &registration.client_secret,
            SecurityLevel::Standard,
            &RequestContext::default(),
        )
        .session_id
        .unwrap();
    let session = a.validate_session(&first).unwrap();
    assert_eq!(session.client_id, registration.client_id);
    assert_eq!(session.expires_at - session.created_at, Duration::hours(1));

    assert!(a.end_session(&first));
    assert!(a.validate_session(&first).is_none());
    assert!(!a.end_session(&first));

    let second = a
        .authenticate_agent(
            &registration.client_id,
            &registration.client_secret,
            SecurityLevel::Standard,
            &RequestContext::default(),
        )
        .session_id
        .unwrap();
    clock.advance(Duration::seconds(3600));
    assert!(a.validate_session(&second).is_none());
}

fn headers_for(envelope: &a2a_trust_fabric::a2a::MessageEnvelope) -> InboundHeaders {
    InboundHeaders {
        bearer_token: Some("peer-token".into()),
        agent_id: Some(envelope.sender.clone()),
        message_id: Some(envelope.id.clone()),
        nonce: Some(envelope.nonce.clone()),
        priority: Some("normal".into()),
    }
}

#[tokio::test]
async fn test_incoming_message_checks() {
    let clock = ManualClock::starting_now();
    let (a, b) = common::orchestrator_pair(&clock, false).await;

    let envelope = a.channel().build_envelope("agent-b", &payment(), false).unwrap();
    let response = b
        .handle_incoming_message(envelope.clone(), &headers_for(&envelope))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.message_id, envelope.id);

    let replay = b
        .handle_incoming_message(envelope.clone(), &headers_for(&envelope))
        .await
        .unwrap_err();
    assert_eq!(replay.code, ErrorCode::ReplayDetected);

    let fresh = a.channel().build_envelope("agent-b", &payment(), true).unwrap();
    let mut no_token = headers_for(&fresh);
    no_token.bearer_token = None;
    let error = b.handle_incoming_message(fresh.clone(), &no_token).await.unwrap_err();
    assert_eq!(error.code, ErrorCode::AuthInvalid);

    let mut spoofed = headers_for(&fresh);
    spoofed.agent_id = Some("agent-z".into());
    let error = b.handle_incoming_message(fresh.clone(), &spoofed).await.unwrap_err();
    assert_eq!(error.code, ErrorCode::ValidationFailed);

    let mut bad_priority = headers_for(&fresh);
    bad_priority.priority = Some("urgent!!".into());
    let error = b
        .handle_incoming_message(fresh.clone(), &bad_priority)
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ValidationFailed);

    let misrouted = a.channel().build_envelope("agent-c", &payment(), false).unwrap();
    let error = b
        .handle_incoming_message(misrouted.clone(), &headers_for(&misrouted))
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ValidationFailed);

    // Header failures happen before the replay guard records the id
    let accepted = b
        .handle_incoming_message(fresh.clone(), &headers_for(&fresh))
        .await
        .unwrap();
    assert!(accepted.success);
}

#[tokio::test]
async fn test_unsigned_envelopes_do_not_consume_sender_quota() {
    let clock = ManualClock::starting_now();
    let (a, b) = common::orchestrator_pair(&clock, false).await;

    for attempt in 1..=150 {
        let mut forged = a.channel().build_envelope("agent-b", &payment(), false).unwrap();
        forged.signature = "00".repeat(32);
        let error = b
            .handle_incoming_message(forged.clone(), &headers_for(&forged))
            .await
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::SignatureInvalid, "attempt {attempt}");
    }
    assert!(b.rate_limiter().record("agent-a").is_none());

    let genuine = a.channel().build_envelope("agent-b", &payment(), false).unwrap();
    let response = b
        .handle_incoming_message(genuine.clone(), &headers_for(&genuine))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(b.rate_limiter().record("agent-a").unwrap().request_count, 1);
}

#[tokio::test]
async fn test_security_metrics_aggregate_audit_log() {
    let clock = ManualClock::starting_now();
    let (a, b) = common::orchestrator_pair(&clock, false).await;
    let registration = register(&a, &["read", "write"]).await;

    a.authenticate_agent(
        &registration.client_id,
        "wrong-secret",
        SecurityLevel::Standard,
        &RequestContext::default(),
    );
    a.authenticate_agent(
        &registration.client_id,
        &registration.client_secret,
        SecurityLevel::High,
        &RequestContext::default(),
    );

    let mut tampered = a.channel().build_envelope("agent-b", &payment(), false).unwrap();
    tampered.payload = serde_json::json!({ "amount": 5, "currency": "THB" });
    let headers = headers_for(&tampered);
    assert!(b.handle_incoming_message(tampered, &headers).await.is_err());

    let metrics = a.get_security_metrics();
    assert_eq!(metrics.total_events, 3);
    assert_eq!(metrics.successful_events, 1);
    assert_eq!(metrics.failed_events, 2);
    assert_eq!(metrics.blocked_requests, 0);
    let kinds: Vec<_> = metrics.security_events.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&SecurityEventKind::AuthenticationFailure));
    assert!(kinds.contains(&SecurityEventKind::PolicyViolation));
    assert_eq!(metrics.top_agents[0].key, registration.client_id);

    let peer_metrics = b.get_security_metrics();
    assert_eq!(peer_metrics.failed_events, 1);
    assert_eq!(
        peer_metrics.security_events[0].kind,
        SecurityEventKind::InvalidSignature
    );
}

#[tokio::test]
async fn test_service_health_counts_connections() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;

    let before = a.service_health().await;
    assert_eq!(before.status, "healthy");
    assert_eq!(before.agent_id, "agent-a");
    assert_eq!(before.active_connections, 0);
    assert!(!before.certificates_enabled);

    a.establish_secure_channel("agent-b", SecurityLevel::Basic)
        .await
        .unwrap();
    let after = a.service_health().await;
    assert_eq!(after.active_connections, 1);
    assert!(after.active_tokens >= 1);
}
