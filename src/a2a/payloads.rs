// ABOUTME: Typed message payloads exchanged between agents
// ABOUTME: Message type names and per-type payload structs with validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ChannelError;

/// Built-in message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Request to collect a payment
    PaymentRequest,
    /// Outcome of a payment
    PaymentResponse,
    /// Lookup of customer information
    CustomerQuery,
    /// Forwarded webhook event
    WebhookNotification,
    /// Liveness probe
    HealthCheck,
}

impl MessageType {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentRequest => "payment_request",
            Self::PaymentResponse => "payment_response",
            Self::CustomerQuery => "customer_query",
            Self::WebhookNotification => "webhook_notification",
            Self::HealthCheck => "health_check",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment_request" => Ok(Self::PaymentRequest),
            "payment_response" => Ok(Self::PaymentResponse),
            "customer_query" => Ok(Self::CustomerQuery),
            "webhook_notification" => Ok(Self::WebhookNotification),
            "health_check" => Ok(Self::HealthCheck),
            other => Err(ChannelError::UnknownMessageType(other.to_owned())),
        }
    }
}

/// Payment collection request; `amount` is in minor currency units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Amount in minor units
    pub amount: u64,
    /// ISO 4217 currency code
    pub currency: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Caller reference for idempotent processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Arbitrary metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Outcome of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Accepted but not settled
    Pending,
    /// Settled
    Succeeded,
    /// Declined or errored
    Failed,
}

/// Payment outcome report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    /// Payment identifier
    pub payment_id: String,
    /// Outcome
    pub status: PaymentStatus,
    /// Settled amount in minor units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    /// ISO 4217 currency code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Customer lookup by id or email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerQuery {
    /// Customer identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    /// Customer email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Requested fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// Webhook event forwarded between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookNotification {
    /// Event name, e.g. `charge.complete`
    pub event: String,
    /// Affected resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Event body
    #[serde(default)]
    pub data: Value,
}

/// Liveness probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Value echoed back by the receiver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

/// A typed payload of one of the built-in kinds
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// Payment request
    PaymentRequest(PaymentRequest),
    /// Payment response
    PaymentResponse(PaymentResponse),
    /// Customer query
    CustomerQuery(CustomerQuery),
    /// Webhook notification
    WebhookNotification(WebhookNotification),
    /// Health check
    HealthCheck(HealthCheck),
}

impl MessagePayload {
    /// Kind of this payload
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::PaymentRequest(_) => MessageType::PaymentRequest,
            Self::PaymentResponse(_) => MessageType::PaymentResponse,
            Self::CustomerQuery(_) => MessageType::CustomerQuery,
            Self::WebhookNotification(_) => MessageType::WebhookNotification,
            Self::HealthCheck(_) => MessageType::HealthCheck,
        }
    }

    /// JSON body carried in the envelope
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_value(&self) -> Result<Value, ChannelError> {
        let value = match self {
            Self::PaymentRequest(p) => serde_json::to_value(p),
            Self::PaymentResponse(p) => serde_json::to_value(p),
            Self::CustomerQuery(p) => serde_json::to_value(p),
            Self::WebhookNotification(p) => serde_json::to_value(p),
            Self::HealthCheck(p) => serde_json::to_value(p),
        }?;
        Ok(value)
    }

    /// Decode and validate a JSON body for `message_type`
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidPayload`] when the body does not fit
    pub fn from_parts(message_type: MessageType, value: Value) -> Result<Self, ChannelError> {
        let payload = match message_type {
            MessageType::PaymentRequest => Self::PaymentRequest(decode(message_type, value)?),
            MessageType::PaymentResponse => Self::PaymentResponse(decode(message_type, value)?),
            MessageType::CustomerQuery => Self::CustomerQuery(decode(message_type, value)?),
            MessageType::WebhookNotification => {
                Self::WebhookNotification(decode(message_type, value)?)
            }
            MessageType::HealthCheck => Self::HealthCheck(decode(message_type, value)?),
        };
        payload.validate()?;
        Ok(payload)
    }

    /// Field-level checks beyond the JSON shape
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidPayload`] describing the first violation
    pub fn validate(&self) -> Result<(), ChannelError> {
        match self {
            Self::PaymentRequest(p) => {
                if p.amount == 0 {
                    return Err(ChannelError::InvalidPayload(
                        "payment amount must be positive".into(),
                    ));
                }
                validate_currency(&p.currency)
            }
            Self::PaymentResponse(p) => {
                if p.payment_id.trim().is_empty() {
                    return Err(ChannelError::InvalidPayload("payment_id is required".into()));
                }
                p.currency.as_deref().map_or(Ok(()), validate_currency)
            }
            Self::CustomerQuery(q) => {
                if q.customer_id.is_none() && q.email.is_none() {
                    return Err(ChannelError::InvalidPayload(
                        "customer query needs a customer_id or an email".into(),
                    ));
                }
                Ok(())
            }
            Self::WebhookNotification(n) => {
                if n.event.trim().is_empty() {
                    return Err(ChannelError::InvalidPayload("event is required".into()));
                }
                Ok(())
            }
            Self::HealthCheck(_) => Ok(()),
        }
    }
}

fn decode<T: DeserializeOwned>(message_type: MessageType, value: Value) -> Result<T, ChannelError> {
    serde_json::from_value(value)
        .map_err(|e| ChannelError::InvalidPayload(format!("{message_type}: {e}")))
}

fn validate_currency(currency: &str) -> Result<(), ChannelError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ChannelError::InvalidPayload(format!(
            "currency '{currency}' is not a three-letter code"
        )))
    }
}
