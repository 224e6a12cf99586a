// ABOUTME: Main library entry point for the A2A trust fabric
// ABOUTME: OAuth2 tokens with PKCE, a private certificate authority and secure agent channels
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # A2A Trust Fabric
//!
//! Lets independent software agents establish trust, authenticate each other
//! and exchange signed, optionally encrypted, replay-protected messages.
//!
//! ## Components
//!
//! - **Token service**: OAuth 2.0 authorization-code flow with mandatory
//!   PKCE (S256), refresh rotation and revocation
//! - **Certificate authority**: private RSA root issuing per-agent X.509
//!   certificates with revocation
//! - **Secure channel**: per-peer OAuth handshake, optional certificate
//!   exchange, HMAC-signed envelopes with AES-256-GCM payloads
//! - **Orchestrator**: registration, authentication, sessions, rate limits,
//!   audit log and security metrics
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use a2a_trust_fabric::a2a::LoopbackTransport;
//! use a2a_trust_fabric::config::FabricConfig;
//! use a2a_trust_fabric::orchestrator::{AuthOrchestrator, Collaborators};
//! use a2a_trust_core::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = FabricConfig::from_env()?;
//!     let transport = Arc::new(LoopbackTransport::new());
//!     let orchestrator = AuthOrchestrator::initialize(config, Collaborators::new(transport)).await?;
//!     println!("agent {} ready", orchestrator.agent_id());
//!     Ok(())
//! }
//! ```

/// Secure channel, envelopes, payloads and transports
pub mod a2a;

/// Private certificate authority
pub mod certificates;

/// Periodic expiry sweep
pub mod cleanup;

/// Injectable wall clock
pub mod clock;

/// Environment configuration
pub mod config;

/// Random generation, digests, signing and payload encryption
pub mod crypto;

/// Structured logging setup
pub mod logging;

/// OAuth 2.0 authorization server with PKCE
pub mod oauth2_server;

/// Authentication orchestrator
pub mod orchestrator;

/// `HTTP` routes
pub mod routes;

/// Audit log and rate limiting
pub mod security;

/// Keyed in-memory storage abstraction
pub mod store;

pub use a2a::{MessageEnvelope, MessagePayload, SecureChannel, SecurityLevel};
pub use certificates::CertificateAuthority;
pub use config::FabricConfig;
pub use oauth2_server::TokenService;
pub use orchestrator::{AuthOrchestrator, Collaborators};
