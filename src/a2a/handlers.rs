// ABOUTME: Inbound message handlers dispatched by message type
// ABOUTME: Default handler acknowledges payloads without calling external providers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::error::ChannelError;
use super::payloads::{
    CustomerQuery, HealthCheck, MessagePayload, PaymentRequest, PaymentResponse,
    WebhookNotification,
};

/// Business logic behind each built-in message type
///
/// Every method receives the authenticated sender id and returns the `data`
/// of the response.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a payment request
    async fn payment_request(&self, sender: &str, request: PaymentRequest) -> Result<Value, ChannelError>;

    /// Handle a payment outcome
    async fn payment_response(&self, sender: &str, response: PaymentResponse) -> Result<Value, ChannelError>;

    /// Handle a customer lookup
    async fn customer_query(&self, sender: &str, query: CustomerQuery) -> Result<Value, ChannelError>;

    /// Handle a forwarded webhook
    async fn webhook_notification(
        &self,
        sender: &str,
        notification: WebhookNotification,
    ) -> Result<Value, ChannelError>;

    /// Answer a liveness probe
    async fn health_check(&self, sender: &str, probe: HealthCheck) -> Result<Value, ChannelError> {
        let _ = sender;
        Ok(json!({ "status": "healthy", "echo": probe.echo }))
    }
}

/// Route a payload to the matching handler method
///
/// # Errors
///
/// Propagates the handler's error
pub async fn dispatch(
    handler: &dyn MessageHandler,
    sender: &str,
    payload: MessagePayload,
) -> Result<Value, ChannelError> {
    match payload {
        MessagePayload::PaymentRequest(request) => handler.payment_request(sender, request).await,
        MessagePayload::PaymentResponse(response) => {
            handler.payment_response(sender, response).await
        }
        MessagePayload::CustomerQuery(query) => handler.customer_query(sender, query).await,
        MessagePayload::WebhookNotification(notification) => {
            handler.webhook_notification(sender, notification).await
        }
        MessagePayload::HealthCheck(probe) => handler.health_check(sender, probe).await,
    }
}

/// Records receipt of every message and echoes its key fields
#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgingHandler;

#[async_trait]
impl MessageHandler for AcknowledgingHandler {
    async fn payment_request(&self, sender: &str, request: PaymentRequest) -> Result<Value, ChannelError> {
        info!(
            sender = %sender,
            amount = request.amount,
            currency = %request.currency,
            "Payment request received"
        );
        Ok(json!({
            "status": "received",
            "amount": request.amount,
            "currency": request.currency,
            "reference": request.reference,
        }))
    }

    async fn payment_response(&self, sender: &str, response: PaymentResponse) -> Result<Value, ChannelError> {
        info!(sender = %sender, payment_id = %response.payment_id, status = ?response.status, "Payment response received");
        Ok(json!({
            "status": "acknowledged",
            "payment_id": response.payment_id,
        }))
    }

    async fn customer_query(&self, sender: &str, query: CustomerQuery) -> Result<Value, ChannelError> {
        info!(sender = %sender, customer_id = ?query.customer_id, "Customer query received");
        Ok(json!({
            "status": "received",
            "customer_id": query.customer_id,
            "email": query.email,
        }))
    }

    async fn webhook_notification(
        &self,
        sender: &str,
        notification: WebhookNotification,
    ) -> Result<Value, ChannelError> {
        info!(sender = %sender, event = %notification.event, "Webhook notification received");
        Ok(json!({
            "status": "processed",
            "event": notification.event,
        }))
    }
}
