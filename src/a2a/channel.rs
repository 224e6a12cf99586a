// ABOUTME: Secure channel managing per-peer handshakes and signed envelope exchange
// ABOUTME: Token exchange, optional certificate handshake, send with retries and validated receive
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Secure Channel
//!
//! Each peer moves through `Uninitialized -> Authenticating -> (TlsHandshake)
//! -> Established -> Closed`. A connection record is stored only once its
//! handshake completes, so a failed or timed-out handshake leaves any earlier
//! connection to the same peer untouched.
//!
//! Sends to one peer hold that peer's connection lock for the whole delivery,
//! which serializes them in call order.

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::connection::{Connection, ConnectionState, ConnectionStatus, SecurityLevel, TlsContext};
use super::envelope::{MessageEnvelope, MessageResponse, SendOptions};
use super::error::ChannelError;
use super::handlers::{dispatch, AcknowledgingHandler, MessageHandler};
use super::payloads::{MessagePayload, MessageType};
use super::replay::ReplayGuard;
use super::transport::{MessageTransport, OutboundMessage};
use crate::certificates::{AgentCertificate, AgentInfo, CertificateAuthority};
use crate::cleanup::ExpirySweep;
use crate::clock::SharedClock;
use crate::crypto::{random_hex, EncryptedPayload, EnvelopeKeys};
use crate::oauth2_server::{authorization_state, pkce, TokenService};
use a2a_trust_core::constants::{a2a::ENVELOPE_NONCE_BYTES, defaults};

/// OAuth client provisioned for this channel's own handshakes
#[derive(Clone)]
pub struct ChannelCredentials {
    /// Local agent id, used as envelope sender and certificate common name
    pub agent_id: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI registered for the client
    pub redirect_uri: String,
}

impl fmt::Debug for ChannelCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCredentials")
            .field("agent_id", &self.agent_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Delivery and replay settings
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Default per-attempt and handshake deadline
    pub request_timeout: Duration,
    /// Retries after the first failed delivery
    pub retry_count: u32,
    /// Pause between retries
    pub retry_delay: Duration,
    /// How long message ids are remembered
    pub replay_window: chrono::Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(defaults::REQUEST_TIMEOUT_MS),
            retry_count: defaults::RETRY_COUNT,
            retry_delay: Duration::from_millis(defaults::RETRY_DELAY_MS),
            replay_window: chrono::Duration::seconds(defaults::REPLAY_WINDOW_SECS),
        }
    }
}

/// Collaborators of a [`SecureChannel`]
pub struct ChannelParts {
    /// Provisioned OAuth client
    pub credentials: ChannelCredentials,
    /// Delivery settings
    pub config: ChannelConfig,
    /// Token service driving handshakes
    pub tokens: Arc<TokenService>,
    /// Certificate authority; `None` disables the certificate handshake
    pub authority: Option<Arc<CertificateAuthority>>,
    /// Envelope signing and encryption keys
    pub keys: EnvelopeKeys,
    /// Delivery mechanism
    pub transport: Arc<dyn MessageTransport>,
    /// Time source
    pub clock: SharedClock,
}

/// Authenticated, signed and optionally encrypted messaging with peers
pub struct SecureChannel {
    credentials: ChannelCredentials,
    config: ChannelConfig,
    tokens: Arc<TokenService>,
    authority: Option<Arc<CertificateAuthority>>,
    keys: EnvelopeKeys,
    transport: Arc<dyn MessageTransport>,
    handler: Arc<dyn MessageHandler>,
    replay: ReplayGuard,
    clock: SharedClock,
    connections: DashMap<String, Arc<Mutex<Connection>>>,
    pending: DashMap<String, ConnectionState>,
    peers: DashMap<String, Url>,
}

/// Removes the in-flight handshake marker however the handshake ends and
/// revokes a token issued by a handshake that never completed
struct PendingHandshake<'a> {
    pending: &'a DashMap<String, ConnectionState>,
    tokens: &'a TokenService,
    peer_id: &'a str,
    issued_token: StdMutex<Option<String>>,
}

impl<'a> PendingHandshake<'a> {
    fn begin(
        pending: &'a DashMap<String, ConnectionState>,
        tokens: &'a TokenService,
        peer_id: &'a str,
    ) -> Self {
        pending.insert(peer_id.to_owned(), ConnectionState::Authenticating);
        Self {
            pending,
            tokens,
            peer_id,
            issued_token: StdMutex::new(None),
        }
    }

    fn advance(&self, state: ConnectionState) {
        self.pending.insert(self.peer_id.to_owned(), state);
    }

    fn hold_token(&self, access_token: &str) {
        if let Ok(mut slot) = self.issued_token.lock() {
            *slot = Some(access_token.to_owned());
        }
    }

    /// The connection now owns the token
    fn complete(self) {
        if let Ok(mut slot) = self.issued_token.lock() {
            slot.take();
        }
    }
}

impl Drop for PendingHandshake<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.peer_id);
        let abandoned = self
            .issued_token
            .get_mut()
            .ok()
            .and_then(Option::take);
        if let Some(token) = abandoned {
            self.tokens.revoke_token(&token);
            debug!(peer_id = %self.peer_id, "Revoked token of abandoned handshake");
        }
    }
}

impl SecureChannel {
    /// Channel with the acknowledging handler
    #[must_use]
    pub fn new(parts: ChannelParts) -> Self {
        let replay = ReplayGuard::new(parts.config.replay_window, Arc::clone(&parts.clock));
        Self {
            credentials: parts.credentials,
            config: parts.config,
            tokens: parts.tokens,
            authority: parts.authority,
            keys: parts.keys,
            transport: parts.transport,
            handler: Arc::new(AcknowledgingHandler),
            replay,
            clock: parts.clock,
            connections: DashMap::new(),
            pending: DashMap::new(),
            peers: DashMap::new(),
        }
    }

    /// Replace the inbound message handler
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Local agent id
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.credentials.agent_id
    }

    /// Record the base URL used to reach `peer_id`
    pub fn register_peer(&self, peer_id: &str, base_url: Url) {
        info!(peer_id = %peer_id, base_url = %base_url, "Registered peer endpoint");
        self.peers.insert(peer_id.to_owned(), base_url);
    }

    /// Base URL of `peer_id`, if registered
    #[must_use]
    pub fn peer_endpoint(&self, peer_id: &str) -> Option<Url> {
        self.peers.get(peer_id).map(|entry| entry.value().clone())
    }

    /// Our own leaf certificate, issued on first use
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::CertificatesDisabled`] without an authority, or
    /// the issuance failure
    pub async fn local_certificate(&self) -> Result<AgentCertificate, ChannelError> {
        let authority = self
            .authority
            .as_ref()
            .ok_or(ChannelError::CertificatesDisabled)?;
        Ok(authority
            .issue_agent_certificate(&self.credentials.agent_id, &AgentInfo::default())
            .await?)
    }

    /// Run the handshake with `peer_id` and store the resulting connection
    ///
    /// # Errors
    ///
    /// Returns the token-exchange failure, [`ChannelError::InvalidPeerCertificate`]
    /// for the high level, or [`ChannelError::Timeout`] when `timeout` (or the
    /// channel default) passes first
    pub async fn initialize_connection(
        &self,
        peer_id: &str,
        security_level: SecurityLevel,
        timeout: Option<Duration>,
    ) -> Result<ConnectionStatus, ChannelError> {
        let limit = timeout.unwrap_or(self.config.request_timeout);
        let pending = PendingHandshake::begin(&self.pending, &self.tokens, peer_id);

        let connection =
            match tokio::time::timeout(limit, self.handshake(peer_id, security_level, &pending))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!(peer_id = %peer_id, timeout_ms = limit.as_millis(), "Handshake timed out");
                    return Err(ChannelError::Timeout {
                        operation: "handshake",
                        after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            };

        let status = connection.status();
        let previous = self
            .connections
            .insert(peer_id.to_owned(), Arc::new(Mutex::new(connection)));
        pending.complete();

        if let Some(previous) = previous {
            let previous = previous.lock().await;
            self.tokens.revoke_token(&previous.access_token);
        }

        info!(
            peer_id = %peer_id,
            security_level = %security_level,
            mutual_tls = status.mutual_tls,
            "Secure connection established"
        );
        Ok(status)
    }

    async fn handshake(
        &self,
        peer_id: &str,
        security_level: SecurityLevel,
        pending: &PendingHandshake<'_>,
    ) -> Result<Connection, ChannelError> {
        let credentials = &self.credentials;
        let verifier = pkce::generate_code_verifier()?;
        let authorization_url = self.tokens.create_authorization_request(
            &credentials.client_id,
            &credentials.redirect_uri,
            &[],
            &verifier,
        )?;
        let code = authorization_state(&authorization_url).ok_or_else(|| {
            ChannelError::Transport("authorization URL carries no state".into())
        })?;
        let tokens = self.tokens.exchange_code_for_token(
            &code,
            &credentials.client_id,
            &credentials.client_secret,
            &credentials.redirect_uri,
            &verifier,
        )?;
        pending.hold_token(&tokens.access_token);
        let identity = self.tokens.validate_token(&tokens.access_token)?;
        debug!(peer_id = %peer_id, client_id = %identity.client_id, "Handshake token issued");

        let tls = if security_level.requires_certificates() {
            pending.advance(ConnectionState::TlsHandshake);
            Some(self.certificate_handshake(peer_id).await?)
        } else {
            None
        };

        let now = self.clock.now();
        Ok(Connection {
            peer_id: peer_id.to_owned(),
            access_token: tokens.access_token,
            token_expires_at: identity.expires_at,
            tls,
            security_level,
            established_at: now,
            last_activity: now,
            is_active: true,
            message_count: 0,
            state: ConnectionState::Established,
        })
    }

    async fn certificate_handshake(&self, peer_id: &str) -> Result<TlsContext, ChannelError> {
        let authority = self
            .authority
            .as_ref()
            .ok_or(ChannelError::CertificatesDisabled)?;
        let own = self.local_certificate().await?;

        let endpoint = self.peer_endpoint(peer_id);
        let peer_certificate = self
            .transport
            .fetch_certificate(peer_id, endpoint.as_ref())
            .await?;
        if !authority.validate_agent_certificate(&peer_certificate, peer_id) {
            return Err(ChannelError::InvalidPeerCertificate(peer_id.to_owned()));
        }

        Ok(TlsContext {
            certificate_pem: own.certificate_pem,
            private_key_pem: own.private_key_pem,
            ca_certificate_pem: own.ca_certificate_pem,
        })
    }

    /// Build, sign, optionally encrypt and deliver a message to `peer_id`
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NoActiveConnection`] without an established
    /// connection, or the delivery failure after retries
    pub async fn send_message(
        &self,
        peer_id: &str,
        payload: &MessagePayload,
        options: SendOptions,
    ) -> Result<MessageResponse, ChannelError> {
        let connection = self
            .connections
            .get(peer_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ChannelError::NoActiveConnection(peer_id.to_owned()))?;

        let mut connection = connection.lock().await;
        if !connection.is_established() {
            return Err(ChannelError::NoActiveConnection(peer_id.to_owned()));
        }

        let envelope = self.build_envelope(peer_id, payload, options.encrypt)?;
        let outbound = OutboundMessage {
            peer_id: peer_id.to_owned(),
            endpoint: self.peer_endpoint(peer_id),
            envelope,
            bearer_token: connection.access_token.clone(),
            priority: options.priority,
            tls: connection.tls.clone(),
        };

        let response = self.transmit(&outbound, options.timeout).await?;
        connection.last_activity = self.clock.now();
        connection.message_count += 1;

        debug!(
            peer_id = %peer_id,
            message_id = %outbound.envelope.id,
            message_type = %outbound.envelope.message_type,
            encrypted = outbound.envelope.encrypted,
            "Message delivered"
        );
        Ok(response)
    }

    /// Signed envelope for `payload`, encrypted when requested
    ///
    /// # Errors
    ///
    /// Returns an error if random generation, encryption or serialization fails
    pub fn build_envelope(
        &self,
        peer_id: &str,
        payload: &MessagePayload,
        encrypt: bool,
    ) -> Result<MessageEnvelope, ChannelError> {
        let plain = payload.to_value()?;
        let body = if encrypt {
            serde_json::to_value(self.keys.encrypt(&serde_json::to_vec(&plain)?)?)?
        } else {
            plain
        };

        let mut envelope = MessageEnvelope {
            id: Uuid::new_v4().to_string(),
            sender: self.credentials.agent_id.clone(),
            recipient: peer_id.to_owned(),
            message_type: payload.message_type().as_str().to_owned(),
            payload: body,
            timestamp: self.clock.now(),
            nonce: random_hex(ENVELOPE_NONCE_BYTES)?,
            signature: String::new(),
            encrypted: encrypt,
        };
        envelope.sign(&self.keys)?;
        Ok(envelope)
    }

    async fn transmit(
        &self,
        outbound: &OutboundMessage,
        timeout: Option<Duration>,
    ) -> Result<MessageResponse, ChannelError> {
        let limit = timeout.unwrap_or(self.config.request_timeout);
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(limit, self.transport.deliver(outbound)).await {
                Ok(result) => result,
                Err(_) => Err(ChannelError::Timeout {
                    operation: "delivery",
                    after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(error) if error.is_retryable() && attempt < self.config.retry_count => {
                    attempt += 1;
                    warn!(
                        peer_id = %outbound.peer_id,
                        message_id = %outbound.envelope.id,
                        attempt,
                        error = %error,
                        "Delivery failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Check the envelope HMAC without recording or dispatching the envelope
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidSignature`] when the signature does not match
    pub fn verify_signature(&self, envelope: &MessageEnvelope) -> Result<(), ChannelError> {
        if envelope.verify(&self.keys) {
            return Ok(());
        }
        warn!(sender = %envelope.sender, message_id = %envelope.id, "Envelope signature rejected");
        Err(ChannelError::InvalidSignature)
    }

    /// Validate an inbound envelope and dispatch it to the handler
    ///
    /// # Errors
    ///
    /// Checked in order: [`ChannelError::InvalidSignature`],
    /// [`ChannelError::ReplayDetected`], [`ChannelError::DecryptionFailed`],
    /// [`ChannelError::UnknownMessageType`] / [`ChannelError::InvalidPayload`],
    /// then any handler failure
    pub async fn receive_message(
        &self,
        envelope: MessageEnvelope,
    ) -> Result<MessageResponse, ChannelError> {
        self.verify_signature(&envelope)?;

        if let Err(error) = self.replay.check_and_record(&envelope.id, envelope.timestamp) {
            warn!(sender = %envelope.sender, message_id = %envelope.id, error = %error, "Replay rejected");
            return Err(error);
        }

        let body = if envelope.encrypted {
            self.decrypt_payload(&envelope)?
        } else {
            envelope.payload.clone()
        };

        let message_type = envelope.message_type.parse::<MessageType>()?;
        let payload = MessagePayload::from_parts(message_type, body)?;
        let data = dispatch(self.handler.as_ref(), &envelope.sender, payload).await?;

        debug!(sender = %envelope.sender, message_id = %envelope.id, message_type = %message_type, "Message processed");
        Ok(MessageResponse::handled(
            envelope.id,
            message_type,
            data,
            self.clock.now(),
        ))
    }

    fn decrypt_payload(&self, envelope: &MessageEnvelope) -> Result<serde_json::Value, ChannelError> {
        let encrypted: EncryptedPayload = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| ChannelError::DecryptionFailed(format!("malformed encrypted payload: {e}")))?;
        let plaintext = self
            .keys
            .decrypt(&encrypted)
            .map_err(|e| ChannelError::DecryptionFailed(e.to_string()))?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| ChannelError::DecryptionFailed(format!("plaintext is not JSON: {e}")))
    }

    /// Close the connection to `peer_id` and revoke its token; returns whether one existed
    pub async fn close_connection(&self, peer_id: &str) -> bool {
        let Some((_, connection)) = self.connections.remove(peer_id) else {
            return false;
        };
        let mut connection = connection.lock().await;
        connection.is_active = false;
        connection.state = ConnectionState::Closed;
        self.tokens.revoke_token(&connection.access_token);
        info!(peer_id = %peer_id, messages = connection.message_count, "Secure connection closed");
        true
    }

    /// Snapshot of the connection or in-flight handshake with `peer_id`
    pub async fn get_connection_status(&self, peer_id: &str) -> Option<ConnectionStatus> {
        let connection = self
            .connections
            .get(peer_id)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(connection) = connection {
            return Some(connection.lock().await.status());
        }
        self.pending
            .get(peer_id)
            .map(|entry| ConnectionStatus::pending(peer_id, *entry.value()))
    }

    /// Snapshots of every connection and in-flight handshake
    pub async fn list_connections(&self) -> Vec<ConnectionStatus> {
        let connections: Vec<_> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut statuses = Vec::with_capacity(connections.len());
        for connection in connections {
            statuses.push(connection.lock().await.status());
        }

        let pending: Vec<_> = self
            .pending
            .iter()
            .filter(|entry| !self.connections.contains_key(entry.key()))
            .map(|entry| ConnectionStatus::pending(entry.key(), *entry.value()))
            .collect();
        statuses.extend(pending);
        statuses.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        statuses
    }

    /// Forget replay ids older than the window
    pub fn purge_replay_cache(&self) -> usize {
        self.replay.purge_expired()
    }
}

impl ExpirySweep for SecureChannel {
    fn sweep_name(&self) -> &'static str {
        "replay"
    }

    fn sweep_expired(&self) -> usize {
        self.purge_replay_cache()
    }
}
