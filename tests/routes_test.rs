// ABOUTME: HTTP-level tests of the OAuth and A2A routes driven through the Axum router
// ABOUTME: Token grants, revocation, inbound envelopes, certificate, health and metrics endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use std::sync::Arc;

use a2a_trust_core::constants::{a2a, endpoints};
use a2a_trust_fabric::a2a::{
    LoopbackTransport, MessageEnvelope, MessagePayload, PaymentRequest,
};
use a2a_trust_fabric::clock::ManualClock;
use a2a_trust_fabric::oauth2_server::{authorization_state, pkce};
use a2a_trust_fabric::orchestrator::AuthOrchestrator;
use a2a_trust_fabric::routes;
use helpers::axum_test::AxumTestRequest;
use serde_json::Value;

const REDIRECT_URI: &str = "https://client.example/callback";

struct IssuedCode {
    client_id: String,
    client_secret: String,
    code: String,
    verifier: String,
}

fn issue_code(orchestrator: &AuthOrchestrator) -> IssuedCode {
    let tokens = orchestrator.token_service();
    let registration = tokens
        .register_client("HTTP Client", vec![REDIRECT_URI.to_owned()], None, None)
        .unwrap();
    let verifier = pkce::generate_code_verifier().unwrap();
    let url = tokens
        .create_authorization_request(&registration.client.client_id, REDIRECT_URI, &[], &verifier)
        .unwrap();
    IssuedCode {
        client_id: registration.client.client_id,
        client_secret: registration.client_secret,
        code: authorization_state(&url).unwrap(),
        verifier,
    }
}

fn envelope_from(sender: &AuthOrchestrator, recipient: &str) -> MessageEnvelope {
    let payload = MessagePayload::PaymentRequest(PaymentRequest {
        amount: 2500,
        currency: "THB".into(),
        description: Some("invoice 42".into()),
        reference: Some("inv-42".into()),
        metadata: None,
    });
    sender
        .channel()
        .build_envelope(recipient, &payload, false)
        .unwrap()
}

async fn exchange(orchestrator: &Arc<AuthOrchestrator>, issued: &IssuedCode) -> (u16, Value) {
    let response = AxumTestRequest::post(endpoints::OAUTH_TOKEN)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", &issued.code),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", &issued.client_id),
            ("client_secret", &issued.client_secret),
            ("code_verifier", &issued.verifier),
        ])
        .send(routes::router(Arc::clone(orchestrator)))
        .await;
    (response.status(), response.json())
}

#[tokio::test]
async fn test_authorization_code_grant_over_http() {
    common::init_test_logging();
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;
    let issued = issue_code(&a);

    let (status, body) = exchange(&a, &issued).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["scope"], "read write");
    let access_token = body["access_token"].as_str().unwrap();
    assert!(a.token_service().validate_token(access_token).is_ok());

    let (status, body) = exchange(&a, &issued).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid_grant");
}

fn authorize_uri(client_id: &str, challenge: &str, method: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", REDIRECT_URI)
        .append_pair("scope", "read")
        .append_pair("state", "client-state-1")
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", method)
        .finish();
    format!("{}?{query}", endpoints::OAUTH_AUTHORIZE)
}

#[tokio::test]
async fn test_authorize_endpoint_redirects_with_code() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;
    let registration = a
        .token_service()
        .register_client("External Client", vec![REDIRECT_URI.to_owned()], None, None)
        .unwrap();
    let client_id = registration.client.client_id;
    let verifier = pkce::generate_code_verifier().unwrap();
    let challenge = pkce::code_challenge(&verifier);

    let response = AxumTestRequest::get(&authorize_uri(&client_id, &challenge, "S256"))
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(response.status(), 302);
    let location = url::Url::parse(&response.header("location").unwrap()).unwrap();
    assert!(location.as_str().starts_with(REDIRECT_URI));
    let pairs: std::collections::HashMap<_, _> = location.query_pairs().into_owned().collect();
    assert_eq!(pairs["state"], "client-state-1");

    let issued = IssuedCode {
        client_id,
        client_secret: registration.client_secret,
        code: pairs["code"].clone(),
        verifier,
    };
    let (status, body) = exchange(&a, &issued).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["scope"], "read");
}

#[tokio::test]
async fn test_authorize_endpoint_rejects_bad_requests() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;
    let registration = a
        .token_service()
        .register_client("External Client", vec![REDIRECT_URI.to_owned()], None, None)
        .unwrap();
    let client_id = registration.client.client_id;
    let challenge = pkce::code_challenge(&pkce::generate_code_verifier().unwrap());

    let plain = AxumTestRequest::get(&authorize_uri(&client_id, &challenge, "plain"))
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(plain.status(), 400);
    assert_eq!(plain.json::<Value>()["error"], "invalid_request");

    let malformed = AxumTestRequest::get(&authorize_uri(&client_id, "too-short", "S256"))
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(malformed.status(), 400);
    assert_eq!(malformed.json::<Value>()["error"], "invalid_request");

    let unknown = AxumTestRequest::get(&authorize_uri("no-such-client", &challenge, "S256"))
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(unknown.status(), 401);
    assert!(unknown.header("location").is_none());
    assert_eq!(unknown.json::<Value>()["error"], "invalid_client");
}

#[tokio::test]
async fn test_refresh_grant_and_revocation_over_http() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;
    let issued = issue_code(&a);
    let (_, tokens) = exchange(&a, &issued).await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_owned();

    let refreshed = AxumTestRequest::post(endpoints::OAUTH_TOKEN)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
        ])
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(refreshed.status(), 200);
    let refreshed: Value = refreshed.json();
    let rotated = refreshed["refresh_token"].as_str().unwrap().to_owned();
    assert_ne!(rotated, refresh_token);

    let revoked = AxumTestRequest::post(endpoints::OAUTH_REVOKE)
        .form(&[("token", &rotated)])
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(revoked.status(), 200);

    // Unknown tokens are still answered with 200
    let unknown = AxumTestRequest::post(endpoints::OAUTH_REVOKE)
        .form(&[("token", "never-issued")])
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(unknown.status(), 200);

    let reused = AxumTestRequest::post(endpoints::OAUTH_TOKEN)
        .form(&[("grant_type", "refresh_token"), ("refresh_token", &rotated)])
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(reused.status(), 400);
    assert_eq!(reused.json::<Value>()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_token_endpoint_rejects_malformed_requests() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;

    let unsupported = AxumTestRequest::post(endpoints::OAUTH_TOKEN)
        .form(&[("grant_type", "client_credentials")])
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(unsupported.status(), 400);
    assert_eq!(unsupported.json::<Value>()["error"], "unsupported_grant_type");

    let incomplete = AxumTestRequest::post(endpoints::OAUTH_TOKEN)
        .form(&[("grant_type", "authorization_code"), ("code", "abc")])
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(incomplete.status(), 400);
    assert_eq!(incomplete.json::<Value>()["error"], "invalid_request");

    let mut issued = issue_code(&a);
    issued.client_secret = "wrong".into();
    let (status, body) = exchange(&a, &issued).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "invalid_client");
}

#[tokio::test]
async fn test_message_endpoint_accepts_signed_envelope() {
    let clock = ManualClock::starting_now();
    let (a, b) = common::orchestrator_pair(&clock, false).await;
    let envelope = envelope_from(&a, "agent-b");

    let response = AxumTestRequest::post(endpoints::A2A_MESSAGES)
        .header("authorization", "Bearer peer-access-token")
        .header(a2a::HEADER_AGENT_ID, &envelope.sender)
        .header(a2a::HEADER_MESSAGE_ID, &envelope.id)
        .header(a2a::HEADER_NONCE, &envelope.nonce)
        .header(a2a::HEADER_PRIORITY, "high")
        .json(&envelope)
        .send(routes::router(Arc::clone(&b)))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["message_id"], envelope.id.as_str());
    assert_eq!(body["data"]["amount"], 2500);
    assert_eq!(body["data"]["reference"], "inv-42");

    let replayed = AxumTestRequest::post(endpoints::A2A_MESSAGES)
        .header("authorization", "Bearer peer-access-token")
        .json(&envelope)
        .send(routes::router(Arc::clone(&b)))
        .await;
    assert_eq!(replayed.status(), 409);
    assert_eq!(replayed.json::<Value>()["error"]["code"], "REPLAY_DETECTED");
}

#[tokio::test]
async fn test_message_endpoint_requires_bearer_token() {
    let clock = ManualClock::starting_now();
    let (a, b) = common::orchestrator_pair(&clock, false).await;
    let envelope = envelope_from(&a, "agent-b");

    let response = AxumTestRequest::post(endpoints::A2A_MESSAGES)
        .json(&envelope)
        .send(routes::router(Arc::clone(&b)))
        .await;
    assert_eq!(response.status(), 401);
    assert_eq!(response.json::<Value>()["error"]["code"], "AUTH_INVALID");

    let mut tampered = envelope_from(&a, "agent-b");
    tampered.payload["amount"] = serde_json::json!(1);
    let response = AxumTestRequest::post(endpoints::A2A_MESSAGES)
        .header("authorization", "Bearer peer-access-token")
        .json(&tampered)
        .send(routes::router(Arc::clone(&b)))
        .await;
    assert_eq!(response.status(), 401);
    assert_eq!(response.json::<Value>()["error"]["code"], "SIGNATURE_INVALID");
}

#[tokio::test]
async fn test_certificate_endpoint() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;
    let disabled = AxumTestRequest::get(endpoints::A2A_CERTIFICATE)
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(disabled.status(), 403);
    assert_eq!(disabled.json::<Value>()["error"]["code"], "POLICY_VIOLATION");

    let transport = Arc::new(LoopbackTransport::new());
    let enabled =
        common::orchestrator(common::fabric_config("agent-c", true), &clock, &transport).await;
    let response = AxumTestRequest::get(endpoints::A2A_CERTIFICATE)
        .send(routes::router(Arc::clone(&enabled)))
        .await;
    assert_eq!(response.status(), 200);
    let pem = response.text();
    assert!(enabled
        .certificate_authority()
        .unwrap()
        .validate_agent_certificate(&pem, "agent-c"));
}

#[tokio::test]
async fn test_health_and_metrics_endpoints() {
    let clock = ManualClock::starting_now();
    let (a, _b) = common::orchestrator_pair(&clock, false).await;
    a.perform_health_check("agent-b").await;

    let health = AxumTestRequest::get(endpoints::A2A_HEALTH)
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(health.status(), 200);
    let health: Value = health.json();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["agent_id"], "agent-a");
    assert_eq!(health["certificates_enabled"], false);

    let metrics = AxumTestRequest::get(endpoints::A2A_METRICS)
        .send(routes::router(Arc::clone(&a)))
        .await;
    assert_eq!(metrics.status(), 200);
    let metrics: Value = metrics.json();
    assert_eq!(metrics["total_events"], 1);
    assert_eq!(metrics["failed_events"], 1);
    assert_eq!(metrics["top_errors"][0]["key"], "TRANSPORT_FAILED");
}
