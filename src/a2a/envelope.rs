// ABOUTME: Signed and optionally encrypted message envelope exchanged between agents
// ABOUTME: Canonical signing form, send options, priorities and structured responses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Message Envelope
//!
//! The HMAC-SHA256 signature covers the canonical JSON serialization of every
//! field except `signature`, taken over the transmitted form. When the payload
//! is encrypted the signature therefore covers the ciphertext
//! (encrypt-then-MAC) and a receiver rejects tampering before decrypting.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ChannelError;
use super::payloads::MessageType;
use crate::crypto::EnvelopeKeys;

/// Message exchanged between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Random message id
    pub id: String,
    /// Sending agent id
    pub sender: String,
    /// Receiving agent id
    pub recipient: String,
    /// Message type wire name
    pub message_type: String,
    /// Plain payload, or `{ciphertext, iv, tag}` when `encrypted`
    pub payload: Value,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Random nonce
    pub nonce: String,
    /// Hex HMAC-SHA256 over the unsigned form
    #[serde(default)]
    pub signature: String,
    /// Whether `payload` is encrypted
    #[serde(default)]
    pub encrypted: bool,
}

/// Field order here fixes the canonical signing form
#[derive(Serialize)]
struct UnsignedEnvelope<'a> {
    id: &'a str,
    sender: &'a str,
    recipient: &'a str,
    message_type: &'a str,
    payload: &'a Value,
    timestamp: &'a DateTime<Utc>,
    nonce: &'a str,
    encrypted: bool,
}

impl MessageEnvelope {
    /// Canonical bytes covered by the signature
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn signing_bytes(&self) -> Result<Vec<u8>, ChannelError> {
        Ok(serde_json::to_vec(&UnsignedEnvelope {
            id: &self.id,
            sender: &self.sender,
            recipient: &self.recipient,
            message_type: &self.message_type,
            payload: &self.payload,
            timestamp: &self.timestamp,
            nonce: &self.nonce,
            encrypted: self.encrypted,
        })?)
    }

    /// Compute and set the signature
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn sign(&mut self, keys: &EnvelopeKeys) -> Result<(), ChannelError> {
        self.signature = keys.sign(&self.signing_bytes()?);
        Ok(())
    }

    /// Whether the signature matches the envelope contents
    #[must_use]
    pub fn verify(&self, keys: &EnvelopeKeys) -> bool {
        !self.signature.is_empty()
            && self
                .signing_bytes()
                .is_ok_and(|bytes| keys.verify(&bytes, &self.signature))
    }
}

/// Delivery priority, forwarded as the `X-Message-Priority` header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    /// Background traffic
    Low,
    /// Default
    #[default]
    Normal,
    /// Time-sensitive
    High,
    /// Must be processed first
    Critical,
}

impl MessagePriority {
    /// Header value
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessagePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown message priority: {other}")),
        }
    }
}

/// Per-message send settings
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Encrypt the payload with AES-256-GCM
    pub encrypt: bool,
    /// Delivery priority
    pub priority: MessagePriority,
    /// Per-attempt deadline; the channel default applies when `None`
    pub timeout: Option<Duration>,
}

impl SendOptions {
    /// Options with encryption enabled
    #[must_use]
    pub fn encrypted() -> Self {
        Self {
            encrypt: true,
            ..Self::default()
        }
    }
}

/// Structured, timestamped result of processing a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Whether the receiver handled the message
    pub success: bool,
    /// Id of the processed envelope
    pub message_id: String,
    /// Type of the processed message
    pub message_type: String,
    /// Handler output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Processing time
    pub timestamp: DateTime<Utc>,
}

impl MessageResponse {
    /// Successful handling
    #[must_use]
    pub fn handled(
        message_id: String,
        message_type: MessageType,
        data: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            success: true,
            message_id,
            message_type: message_type.as_str().to_owned(),
            data: Some(data),
            error: None,
            timestamp,
        }
    }
}
