// ABOUTME: OAuth 2.0 token service for agent-to-agent authentication
// ABOUTME: Authorization-code flow with PKCE, opaque bearer tokens and expiry purging
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Token service error type
pub mod error;
/// OAuth 2.0 data models and types
pub mod models;
/// PKCE verifier and challenge helpers
pub mod pkce;
/// Client registration, code exchange and token lifecycle
pub mod token_service;

pub use error::TokenError;

/// Identity resolved from a bearer token
pub use models::AgentIdentity;
/// Code issued for a client-supplied challenge
pub use models::AuthorizationGrant;
/// Client registration result
pub use models::ClientRegistration;
/// OAuth 2.0 grant type
pub use models::GrantType;
/// OAuth 2.0 error response
pub use models::OAuth2Error;
/// Expiry sweep result
pub use models::PurgeReport;
/// Registered client record
pub use models::RegisteredClient;
/// Token exchange response
pub use models::TokenResponse;
/// Token lifetimes and issuer
pub use models::TokenServiceConfig;

pub use token_service::{authorization_state, TokenService, TokenStores};
