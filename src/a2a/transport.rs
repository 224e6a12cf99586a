// ABOUTME: Message transports carrying envelopes to peers
// ABOUTME: HTTP delivery with bearer and A2A headers plus an in-process loopback
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::channel::SecureChannel;
use super::connection::TlsContext;
use super::envelope::{MessageEnvelope, MessagePriority, MessageResponse};
use super::error::ChannelError;
use crate::crypto::sha256_hex;
use a2a_trust_core::constants::{a2a, endpoints};
use a2a_trust_core::ErrorCode;

/// Envelope ready for delivery with the connection context it travels under
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Receiving agent id
    pub peer_id: String,
    /// Peer base URL from the directory
    pub endpoint: Option<Url>,
    /// Signed envelope
    pub envelope: MessageEnvelope,
    /// Bearer token of the connection
    pub bearer_token: String,
    /// Delivery priority
    pub priority: MessagePriority,
    /// Mutual TLS material for high-security connections
    pub tls: Option<TlsContext>,
}

/// Carries envelopes and certificate requests to peers
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver one envelope and return the peer's response
    async fn deliver(&self, message: &OutboundMessage) -> Result<MessageResponse, ChannelError>;

    /// Fetch the peer's leaf certificate PEM
    async fn fetch_certificate(
        &self,
        peer_id: &str,
        endpoint: Option<&Url>,
    ) -> Result<String, ChannelError>;
}

/// Mutual TLS client built for one peer's connection material
struct PeerClient {
    fingerprint: String,
    client: reqwest::Client,
}

/// HTTP transport built on reqwest
///
/// High-security connections get a client presenting the agent certificate
/// and trusting only the fabric CA; it is built once per peer and rebuilt when
/// the connection's certificate material changes.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
    peer_clients: DashMap<String, PeerClient>,
}

impl HttpTransport {
    /// Transport whose requests time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout,
            peer_clients: DashMap::new(),
        })
    }

    fn client_for(
        &self,
        peer_id: &str,
        tls: Option<&TlsContext>,
    ) -> Result<reqwest::Client, ChannelError> {
        let Some(tls) = tls else {
            return Ok(self.client.clone());
        };
        let fingerprint = sha256_hex(
            format!("{}{}", tls.certificate_pem, tls.ca_certificate_pem).as_bytes(),
        );
        if let Some(cached) = self.peer_clients.get(peer_id) {
            if cached.fingerprint == fingerprint {
                return Ok(cached.client.clone());
            }
        }

        let client = self.build_mtls_client(tls)?;
        debug!(peer_id = %peer_id, "Built mutual TLS client");
        self.peer_clients.insert(
            peer_id.to_owned(),
            PeerClient {
                fingerprint,
                client: client.clone(),
            },
        );
        Ok(client)
    }

    fn build_mtls_client(&self, tls: &TlsContext) -> Result<reqwest::Client, ChannelError> {
        let identity = reqwest::Identity::from_pem(
            format!("{}\n{}", tls.certificate_pem, tls.private_key_pem).as_bytes(),
        )
        .map_err(|e| ChannelError::Transport(format!("invalid client identity: {e}")))?;
        let ca = reqwest::Certificate::from_pem(tls.ca_certificate_pem.as_bytes())
            .map_err(|e| ChannelError::Transport(format!("invalid CA certificate: {e}")))?;
        reqwest::Client::builder()
            .timeout(self.timeout)
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .identity(identity)
            .add_root_certificate(ca)
            .build()
            .map_err(|e| ChannelError::Transport(format!("failed to create mTLS client: {e}")))
    }

    /// Peers holding a cached mutual TLS client
    #[must_use]
    pub fn cached_peer_clients(&self) -> usize {
        self.peer_clients.len()
    }

    fn map_send_error(&self, error: &reqwest::Error) -> ChannelError {
        if error.is_timeout() {
            ChannelError::Timeout {
                operation: "delivery",
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            ChannelError::Transport(error.to_string())
        }
    }
}

fn endpoint_url(peer_id: &str, endpoint: Option<&Url>, path: &str) -> Result<Url, ChannelError> {
    let base = endpoint.ok_or_else(|| ChannelError::UnknownPeer(peer_id.to_owned()))?;
    base.join(path)
        .map_err(|e| ChannelError::Transport(format!("invalid peer URL for {peer_id}: {e}")))
}

#[async_trait]
impl MessageTransport for HttpTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<MessageResponse, ChannelError> {
        let url = endpoint_url(
            &message.peer_id,
            message.endpoint.as_ref(),
            endpoints::A2A_MESSAGES,
        )?;
        let client = self.client_for(&message.peer_id, message.tls.as_ref())?;

        debug!(peer_id = %message.peer_id, message_id = %message.envelope.id, url = %url, "Delivering envelope");
        let response = client
            .post(url)
            .bearer_auth(&message.bearer_token)
            .header(a2a::HEADER_AGENT_ID, &message.envelope.sender)
            .header(a2a::HEADER_MESSAGE_ID, &message.envelope.id)
            .header(a2a::HEADER_NONCE, &message.envelope.nonce)
            .header(a2a::HEADER_PRIORITY, message.priority.as_str())
            .json(&message.envelope)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<MessageResponse>()
                .await
                .map_err(|e| ChannelError::Transport(format!("unreadable peer response: {e}")));
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message_text = body["error"]["message"]
            .as_str()
            .unwrap_or("no error description")
            .to_owned();
        if status.is_server_error() {
            return Err(ChannelError::Transport(format!(
                "peer answered {status}: {message_text}"
            )));
        }
        let code = serde_json::from_value::<ErrorCode>(body["error"]["code"].clone())
            .unwrap_or(ErrorCode::TransportFailed);
        Err(ChannelError::Rejected {
            code,
            message: message_text,
        })
    }

    async fn fetch_certificate(
        &self,
        peer_id: &str,
        endpoint: Option<&Url>,
    ) -> Result<String, ChannelError> {
        let url = endpoint_url(peer_id, endpoint, endpoints::A2A_CERTIFICATE)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;
        if !response.status().is_success() {
            return Err(ChannelError::Transport(format!(
                "peer {peer_id} answered {} for its certificate",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}

/// In-process transport routing envelopes straight to other channels
#[derive(Default)]
pub struct LoopbackTransport {
    peers: DashMap<String, Weak<SecureChannel>>,
}

impl LoopbackTransport {
    /// Empty loopback
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route messages for `channel`'s agent id to `channel`
    pub fn connect(&self, channel: &Arc<SecureChannel>) {
        self.peers
            .insert(channel.agent_id().to_owned(), Arc::downgrade(channel));
    }

    fn peer(&self, peer_id: &str) -> Result<Arc<SecureChannel>, ChannelError> {
        self.peers
            .get(peer_id)
            .and_then(|entry| entry.value().upgrade())
            .ok_or_else(|| ChannelError::UnknownPeer(peer_id.to_owned()))
    }
}

#[async_trait]
impl MessageTransport for LoopbackTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<MessageResponse, ChannelError> {
        let peer = self.peer(&message.peer_id)?;
        peer.receive_message(message.envelope.clone()).await
    }

    async fn fetch_certificate(
        &self,
        peer_id: &str,
        _endpoint: Option<&Url>,
    ) -> Result<String, ChannelError> {
        let peer = self.peer(peer_id)?;
        Ok(peer.local_certificate().await?.certificate_pem)
    }
}
