// ABOUTME: A2A route handlers for inbound envelopes, certificate exchange, health and metrics
// ABOUTME: Extracts bearer and A2A headers and hands envelopes to the orchestrator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! A2A routes for agent-to-agent communication

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::a2a::{MessageEnvelope, MessageResponse};
use crate::orchestrator::{AuthOrchestrator, InboundHeaders, ServiceHealth};
use crate::security::SecurityMetrics;
use a2a_trust_core::constants::{a2a, endpoints};
use a2a_trust_core::{AppError, AppResult};

/// A2A routes implementation
pub struct A2ARoutes;

impl A2ARoutes {
    /// Create all A2A routes
    ///
    /// - `POST /a2a/messages` - signed envelope delivery
    /// - `GET /a2a/certificate` - this agent's leaf certificate PEM
    /// - `GET /a2a/health` - service liveness
    /// - `GET /a2a/metrics` - security metrics from the audit log
    pub fn routes(orchestrator: Arc<AuthOrchestrator>) -> Router {
        Router::new()
            .route(endpoints::A2A_MESSAGES, post(Self::handle_message))
            .route(endpoints::A2A_CERTIFICATE, get(Self::handle_certificate))
            .route(endpoints::A2A_HEALTH, get(Self::handle_health))
            .route(endpoints::A2A_METRICS, get(Self::handle_metrics))
            .with_state(orchestrator)
    }

    async fn handle_message(
        State(orchestrator): State<Arc<AuthOrchestrator>>,
        headers: HeaderMap,
        Json(envelope): Json<MessageEnvelope>,
    ) -> AppResult<Json<MessageResponse>> {
        let inbound = inbound_headers(&headers);
        let response = orchestrator
            .handle_incoming_message(envelope, &inbound)
            .await?;
        Ok(Json(response))
    }

    async fn handle_certificate(
        State(orchestrator): State<Arc<AuthOrchestrator>>,
    ) -> AppResult<Response> {
        let certificate = orchestrator
            .channel()
            .local_certificate()
            .await
            .map_err(AppError::from)?;
        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/x-pem-file")],
            certificate.certificate_pem,
        )
            .into_response())
    }

    async fn handle_health(State(orchestrator): State<Arc<AuthOrchestrator>>) -> Json<ServiceHealth> {
        Json(orchestrator.service_health().await)
    }

    async fn handle_metrics(
        State(orchestrator): State<Arc<AuthOrchestrator>>,
    ) -> Json<SecurityMetrics> {
        Json(orchestrator.get_security_metrics())
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn inbound_headers(headers: &HeaderMap) -> InboundHeaders {
    let bearer_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned());
    InboundHeaders {
        bearer_token,
        agent_id: header_value(headers, a2a::HEADER_AGENT_ID),
        message_id: header_value(headers, a2a::HEADER_MESSAGE_ID),
        nonce: header_value(headers, a2a::HEADER_NONCE),
        priority: header_value(headers, a2a::HEADER_PRIORITY),
    }
}
