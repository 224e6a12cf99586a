// ABOUTME: Secure agent-to-agent channel with signed and optionally encrypted envelopes
// ABOUTME: Handshakes, replay protection, typed payloads, handlers and transports
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # A2A (Agent-to-Agent) Secure Channel
//!
//! Connections are established with an OAuth token exchange and, at the high
//! security level, a certificate exchange validated against the shared CA.
//! Envelopes are HMAC-SHA256 signed over their canonical form; payloads may be
//! AES-256-GCM encrypted before signing.

/// Connection lifecycle and the channel itself
pub mod channel;
/// Connection records and status snapshots
pub mod connection;
/// Envelope wire format and send options
pub mod envelope;
/// Channel error type
pub mod error;
/// Inbound message handlers
pub mod handlers;
/// Typed message payloads
pub mod payloads;
/// Replay protection
pub mod replay;
/// HTTP and loopback transports
pub mod transport;

pub use channel::{ChannelConfig, ChannelCredentials, ChannelParts, SecureChannel};
pub use connection::{ConnectionState, ConnectionStatus, SecurityLevel};
pub use envelope::{MessageEnvelope, MessagePriority, MessageResponse, SendOptions};
pub use error::ChannelError;
pub use handlers::{AcknowledgingHandler, MessageHandler};
pub use payloads::{
    CustomerQuery, HealthCheck, MessagePayload, MessageType, PaymentRequest, PaymentResponse,
    PaymentStatus, WebhookNotification,
};
pub use replay::ReplayGuard;
pub use transport::{HttpTransport, LoopbackTransport, MessageTransport, OutboundMessage};
