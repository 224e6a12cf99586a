// ABOUTME: Route module organization for the trust fabric HTTP endpoints
// ABOUTME: Combines OAuth and A2A routes behind a request tracing layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Route module for the trust fabric server
//!
//! Each domain module contains only route definitions and thin handlers that
//! delegate to the orchestrator.

/// Agent-to-Agent (A2A) routes
pub mod a2a;
/// OAuth 2.0 token routes
pub mod oauth;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::orchestrator::AuthOrchestrator;

/// Agent-to-Agent route handlers
pub use a2a::A2ARoutes;
/// OAuth 2.0 route handlers
pub use oauth::OAuthRoutes;

/// Complete HTTP surface of one agent
pub fn router(orchestrator: Arc<AuthOrchestrator>) -> Router {
    Router::new()
        .merge(OAuthRoutes::routes(Arc::clone(&orchestrator)))
        .merge(A2ARoutes::routes(orchestrator))
        .layer(TraceLayer::new_for_http())
}
