// ABOUTME: Authentication orchestrator composing tokens, certificates and the secure channel
// ABOUTME: Registration, authentication, channels, messaging, sessions, rate limits and audit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Authentication Orchestrator
//!
//! Single entry point for agents. Every operation is rate limited where it
//! accepts untrusted input and audited whether it succeeds or fails.
//! `authenticate_agent` and `perform_health_check` report failures in their
//! return value; the other operations propagate [`AppError`].

/// Request and result types
pub mod models;
/// Session registry
pub mod sessions;
/// Registration input validation
pub mod validation;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::a2a::{
    AcknowledgingHandler, ChannelCredentials, ChannelParts, HealthCheck, MessageEnvelope,
    MessageHandler, MessagePayload, MessagePriority, MessageResponse, MessageTransport,
    SecureChannel, SecurityLevel, SendOptions,
};
use crate::certificates::CertificateAuthority;
use crate::cleanup::{CleanupTask, ExpirySweep};
use crate::clock::{SharedClock, SystemClock};
use crate::config::FabricConfig;
use crate::oauth2_server::{authorization_state, pkce, TokenError, TokenService};
use crate::security::{
    AgentRateLimiter, AuditAction, AuditEvent, AuditLog, SecurityMetrics,
};
use a2a_trust_core::constants::{defaults, endpoints, oauth};
use a2a_trust_core::{AppError, AppResult};

pub use models::{
    AgentRegistration, AuthFailure, AuthenticationOutcome, ChannelInfo, HealthCheckResult,
    InboundHeaders, OAuthEndpoints, RegistrationResult, RequestContext, ServiceHealth, Session,
};
pub use sessions::SessionManager;
pub use validation::validate_registration;

/// Failure message when the high level is requested without a certificate authority
pub const MTLS_REQUIRED_MESSAGE: &str = "mTLS is required for high security level";

/// Failure message when the high level is requested without the admin scope
pub const ADMIN_SCOPE_REQUIRED_MESSAGE: &str = "admin scope is required for high security level";

/// Pluggable collaborators of the orchestrator
pub struct Collaborators {
    /// Delivery mechanism for outbound envelopes
    pub transport: Arc<dyn MessageTransport>,
    /// Time source
    pub clock: SharedClock,
    /// Handler for inbound messages
    pub handler: Arc<dyn MessageHandler>,
}

impl Collaborators {
    /// System clock and the acknowledging handler over `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        Self {
            transport,
            clock: SystemClock::shared(),
            handler: Arc::new(AcknowledgingHandler),
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the inbound handler
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = handler;
        self
    }
}

/// Facade over the token service, certificate authority and secure channel
pub struct AuthOrchestrator {
    config: FabricConfig,
    clock: SharedClock,
    tokens: Arc<TokenService>,
    authority: Option<Arc<CertificateAuthority>>,
    channel: Arc<SecureChannel>,
    rate_limiter: AgentRateLimiter,
    audit: AuditLog,
    sessions: Arc<SessionManager>,
}

impl AuthOrchestrator {
    /// Build every component and provision the channel's own OAuth client
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate authority cannot be loaded or
    /// generated, or if the channel client cannot be registered
    pub async fn initialize(config: FabricConfig, collaborators: Collaborators) -> AppResult<Self> {
        let clock = collaborators.clock;
        let tokens = TokenService::new(config.token_service_config(), Arc::clone(&clock)).into_shared();

        let authority = if config.security.enable_certificates {
            let authority =
                CertificateAuthority::initialize(config.certificates.clone(), Arc::clone(&clock))
                    .await?;
            Some(Arc::new(authority))
        } else {
            info!("Certificate authority disabled; high security level unavailable");
            None
        };

        let callback = config
            .agent
            .base_url
            .join(endpoints::A2A_CALLBACK)
            .map_err(|e| AppError::config_invalid(format!("A2A_BASE_URL: {e}")))?
            .to_string();
        let registration = tokens.register_client(
            &config.agent.agent_name,
            vec![callback.clone()],
            Some(oauth::ALLOWED_SCOPES.iter().map(|s| (*s).to_owned()).collect()),
            None,
        )?;
        let credentials = ChannelCredentials {
            agent_id: config.agent.agent_id.clone(),
            client_id: registration.client.client_id.clone(),
            client_secret: registration.client_secret,
            redirect_uri: callback,
        };

        let channel = SecureChannel::new(ChannelParts {
            credentials,
            config: config.channel_config(),
            tokens: Arc::clone(&tokens),
            authority: authority.clone(),
            keys: config.crypto.envelope_keys(),
            transport: collaborators.transport,
            clock: Arc::clone(&clock),
        })
        .with_handler(collaborators.handler);
        for (peer_id, base_url) in &config.transport.peers {
            channel.register_peer(peer_id, base_url.clone());
        }

        info!(
            agent_id = %config.agent.agent_id,
            client_id = %registration.client.client_id,
            certificates = authority.is_some(),
            "Authentication orchestrator initialized"
        );

        Ok(Self {
            rate_limiter: AgentRateLimiter::new(
                config.security.rate_limit_per_minute,
                Arc::clone(&clock),
            ),
            audit: AuditLog::new(
                config.security.audit_capacity,
                config.security.audit_logging,
                Arc::clone(&clock),
            ),
            sessions: Arc::new(SessionManager::new(
                config.security.max_session_duration,
                Arc::clone(&clock),
            )),
            channel: Arc::new(channel),
            config,
            clock,
            tokens,
            authority,
        })
    }

    /// Local agent id
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.config.agent.agent_id
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &FabricConfig {
        &self.config
    }

    /// Token service
    #[must_use]
    pub const fn token_service(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Certificate authority, when enabled
    #[must_use]
    pub const fn certificate_authority(&self) -> Option<&Arc<CertificateAuthority>> {
        self.authority.as_ref()
    }

    /// Secure channel
    #[must_use]
    pub const fn channel(&self) -> &Arc<SecureChannel> {
        &self.channel
    }

    /// Audit log
    #[must_use]
    pub const fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Rate limiter
    #[must_use]
    pub const fn rate_limiter(&self) -> &AgentRateLimiter {
        &self.rate_limiter
    }

    /// Start the periodic sweep over tokens, replay ids and sessions
    #[must_use]
    pub fn spawn_cleanup(&self) -> CleanupTask {
        let targets: Vec<Arc<dyn ExpirySweep>> = vec![
            Arc::clone(&self.tokens) as Arc<dyn ExpirySweep>,
            Arc::clone(&self.channel) as Arc<dyn ExpirySweep>,
            Arc::clone(&self.sessions) as Arc<dyn ExpirySweep>,
        ];
        CleanupTask::start(targets, self.config.oauth.cleanup_interval)
    }

    /// Register an agent's OAuth client and, when enabled, issue its certificate
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed input, or the token or
    /// certificate failure
    pub async fn register_agent(
        &self,
        registration: AgentRegistration,
    ) -> AppResult<RegistrationResult> {
        let audit_id = registration
            .agent_id
            .clone()
            .unwrap_or_else(|| registration.name.clone());

        match self.register(registration).await {
            Ok(result) => {
                self.audit.record(
                    AuditEvent::success(&result.agent_id, AuditAction::RegisterAgent, &result.client_id)
                        .with_details(json!({
                            "scopes": result.scopes,
                            "certificate_serial": result.certificate.as_ref().map(|c| c.serial),
                        })),
                );
                info!(agent_id = %result.agent_id, client_id = %result.client_id, "Agent registered");
                Ok(result)
            }
            Err(error) => {
                self.audit.record(AuditEvent::failure(
                    &audit_id,
                    AuditAction::RegisterAgent,
                    "oauth/client",
                    &error,
                ));
                Err(error)
            }
        }
    }

    async fn register(&self, registration: AgentRegistration) -> AppResult<RegistrationResult> {
        validate_registration(&registration)?;

        let client = self.tokens.register_client(
            registration.name.trim(),
            registration.redirect_uris,
            registration.scopes,
            None,
        )?;
        let client_id = client.client.client_id.clone();
        let agent_id = registration
            .agent_id
            .unwrap_or_else(|| client_id.clone());

        let certificate = match &self.authority {
            Some(authority) => {
                match authority
                    .issue_agent_certificate(&agent_id, &registration.agent_info)
                    .await
                {
                    Ok(certificate) => Some(certificate),
                    Err(error) => {
                        if let Err(revoke_error) = self.tokens.revoke_client(&client_id) {
                            warn!(client_id = %client_id, error = %revoke_error, "Failed to roll back client registration");
                        }
                        return Err(error.into());
                    }
                }
            }
            None => None,
        };

        Ok(RegistrationResult {
            agent_id,
            client_id,
            client_secret: client.client_secret,
            scopes: client.client.scopes,
            certificate,
            endpoints: self.oauth_endpoints()?,
        })
    }

    fn oauth_endpoints(&self) -> AppResult<OAuthEndpoints> {
        let base = &self.config.agent.base_url;
        let join = |path: &str| {
            base.join(path)
                .map(String::from)
                .map_err(|e| AppError::internal(format!("invalid endpoint URL: {e}")))
        };
        Ok(OAuthEndpoints {
            authorization_endpoint: join(endpoints::OAUTH_AUTHORIZE)?,
            token_endpoint: join(endpoints::OAUTH_TOKEN)?,
            revocation_endpoint: join(endpoints::OAUTH_REVOKE)?,
        })
    }

    /// Authenticate client credentials at `security_level` and open a session
    ///
    /// Never fails; the outcome carries the error code and message instead.
    pub fn authenticate_agent(
        &self,
        client_id: &str,
        client_secret: &str,
        security_level: SecurityLevel,
        context: &RequestContext,
    ) -> AuthenticationOutcome {
        match self.authenticate(client_id, client_secret, security_level, context) {
            Ok(outcome) => {
                self.audit.record(
                    AuditEvent::success(client_id, AuditAction::Authenticate, endpoints::OAUTH_TOKEN)
                        .with_details(json!({ "security_level": security_level })),
                );
                info!(client_id = %client_id, security_level = %security_level, "Agent authenticated");
                outcome
            }
            Err(error) => {
                self.audit.record(
                    AuditEvent::failure(client_id, AuditAction::Authenticate, endpoints::OAUTH_TOKEN, &error),
                );
                AuthenticationOutcome::failed(security_level, error)
            }
        }
    }

    fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
        security_level: SecurityLevel,
        context: &RequestContext,
    ) -> AppResult<AuthenticationOutcome> {
        let status = self.rate_limiter.check(client_id);
        if !status.allowed {
            return Err(AppError::rate_limit_exceeded(
                client_id,
                status.limit,
                status.reset_at,
            ));
        }

        let policy = &self.config.security;
        if !policy.allows_ip(context.ip_address) {
            return Err(AppError::permission_denied("Client address is not allowed"));
        }
        if !policy.allows_user_agent(context.user_agent.as_deref()) {
            return Err(AppError::permission_denied("User agent is not allowed"));
        }
        if security_level.requires_certificates() && self.authority.is_none() {
            return Err(AppError::policy_violation(MTLS_REQUIRED_MESSAGE));
        }

        let client = self
            .tokens
            .get_client(client_id)
            .filter(|client| client.is_active)
            .ok_or(TokenError::InvalidClient)?;
        let redirect_uri = client
            .redirect_uris
            .first()
            .cloned()
            .ok_or(TokenError::InvalidRedirectUri)?;

        let verifier = pkce::generate_code_verifier().map_err(TokenError::from)?;
        let authorization_url =
            self.tokens
                .create_authorization_request(client_id, &redirect_uri, &[], &verifier)?;
        let code = authorization_state(&authorization_url)
            .ok_or_else(|| AppError::internal("authorization URL carries no state"))?;
        let tokens = self.tokens.exchange_code_for_token(
            &code,
            client_id,
            client_secret,
            &redirect_uri,
            &verifier,
        )?;
        let identity = self.tokens.validate_token(&tokens.access_token)?;

        if security_level == SecurityLevel::High && !identity.has_scope(oauth::SCOPE_ADMIN) {
            self.tokens.revoke_token(&tokens.access_token);
            return Err(AppError::permission_denied(ADMIN_SCOPE_REQUIRED_MESSAGE));
        }

        let session = self
            .sessions
            .create(&identity, security_level)
            .map_err(|e| AppError::internal(e.to_string()))?;

        Ok(AuthenticationOutcome {
            success: true,
            security_level,
            identity: Some(identity),
            session_id: Some(session.session_id),
            tokens: Some(tokens),
            error: None,
        })
    }

    /// Run the channel handshake with `peer_id`, then a health-check round trip
    ///
    /// # Errors
    ///
    /// Returns a policy violation when the high level is requested without
    /// certificates, or the handshake failure
    pub async fn establish_secure_channel(
        &self,
        peer_id: &str,
        security_level: SecurityLevel,
    ) -> AppResult<ChannelInfo> {
        match self.establish(peer_id, security_level).await {
            Ok(info) => {
                self.audit.record(
                    AuditEvent::success(self.agent_id(), AuditAction::EstablishChannel, peer_id)
                        .with_details(json!({
                            "security_level": security_level,
                            "mutual_tls": info.connection.mutual_tls,
                            "healthy": info.health.healthy,
                        })),
                );
                Ok(info)
            }
            Err(error) => {
                self.audit.record(AuditEvent::failure(
                    self.agent_id(),
                    AuditAction::EstablishChannel,
                    peer_id,
                    &error,
                ));
                Err(error)
            }
        }
    }

    async fn establish(&self, peer_id: &str, security_level: SecurityLevel) -> AppResult<ChannelInfo> {
        if security_level.requires_certificates() && self.authority.is_none() {
            return Err(AppError::policy_violation(MTLS_REQUIRED_MESSAGE));
        }

        let connection = self
            .channel
            .initialize_connection(peer_id, security_level, None)
            .await?;
        let health = self.perform_health_check(peer_id).await;
        let connection = self
            .channel
            .get_connection_status(peer_id)
            .await
            .unwrap_or(connection);

        Ok(ChannelInfo {
            peer_id: peer_id.to_owned(),
            connection,
            health,
        })
    }

    /// Send `payload` to `peer_id` over its established channel
    ///
    /// Encryption is forced when the policy level or the connection level
    /// requires it.
    ///
    /// # Errors
    ///
    /// Returns a rate-limit error when `peer_id` exceeded its ceiling, or the
    /// channel failure
    pub async fn send_secure_message(
        &self,
        peer_id: &str,
        payload: &MessagePayload,
        options: SendOptions,
    ) -> AppResult<MessageResponse> {
        let message_type = payload.message_type();
        match self.send(peer_id, payload, options).await {
            Ok(response) => {
                self.audit.record(
                    AuditEvent::success(self.agent_id(), AuditAction::SendMessage, peer_id)
                        .with_details(json!({
                            "message_id": response.message_id,
                            "message_type": message_type,
                        })),
                );
                Ok(response)
            }
            Err(error) => {
                self.audit.record(
                    AuditEvent::failure(self.agent_id(), AuditAction::SendMessage, peer_id, &error)
                        .with_details(json!({
                            "message_type": message_type,
                            "error": error.message,
                        })),
                );
                Err(error)
            }
        }
    }

    async fn send(
        &self,
        peer_id: &str,
        payload: &MessagePayload,
        mut options: SendOptions,
    ) -> AppResult<MessageResponse> {
        let status = self.rate_limiter.check(peer_id);
        if !status.allowed {
            return Err(AppError::rate_limit_exceeded(
                peer_id,
                status.limit,
                status.reset_at,
            ));
        }

        let connection_level = self
            .channel
            .get_connection_status(peer_id)
            .await
            .and_then(|status| status.security_level);
        if self.config.security.security_level.requires_encryption()
            || connection_level.is_some_and(|level| level.requires_encryption())
        {
            options.encrypt = true;
        }

        Ok(self.channel.send_message(peer_id, payload, options).await?)
    }

    /// Unencrypted health-check round trip to `peer_id`; never fails
    pub async fn perform_health_check(&self, peer_id: &str) -> HealthCheckResult {
        let started = Instant::now();
        let options = SendOptions {
            encrypt: false,
            priority: MessagePriority::High,
            timeout: Some(Duration::from_millis(defaults::HEALTH_CHECK_TIMEOUT_MS)),
        };
        let check = MessagePayload::HealthCheck(HealthCheck {
            echo: Some(Uuid::new_v4().to_string()),
        });

        let result = self.channel.send_message(peer_id, &check, options).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (healthy, error) = match result {
            Ok(response) if response.success => (true, None),
            Ok(response) => (
                false,
                Some(
                    response
                        .error
                        .unwrap_or_else(|| "peer reported a failed health check".to_owned()),
                ),
            ),
            Err(error) => (false, Some(error.to_string())),
        };

        let event = if healthy {
            AuditEvent::success(self.agent_id(), AuditAction::HealthCheck, peer_id)
        } else {
            AuditEvent::failure(
                self.agent_id(),
                AuditAction::HealthCheck,
                peer_id,
                &AppError::new(
                    a2a_trust_core::ErrorCode::TransportFailed,
                    error.clone().unwrap_or_default(),
                ),
            )
        };
        self.audit
            .record(event.with_details(json!({ "latency_ms": latency_ms })));

        HealthCheckResult {
            peer_id: peer_id.to_owned(),
            healthy,
            latency_ms,
            checked_at: self.clock.now(),
            error,
        }
    }

    /// Validate and process an envelope delivered to the message endpoint
    ///
    /// # Errors
    ///
    /// Returns an auth error without a bearer token, a validation error when
    /// the headers disagree with the envelope, a rate-limit error, or the
    /// channel's signature, replay, decryption or payload failure
    pub async fn handle_incoming_message(
        &self,
        envelope: MessageEnvelope,
        headers: &InboundHeaders,
    ) -> AppResult<MessageResponse> {
        let sender = envelope.sender.clone();
        let message_id = envelope.id.clone();
        let message_type = envelope.message_type.clone();

        match self.receive(envelope, headers).await {
            Ok(response) => {
                self.audit.record(
                    AuditEvent::success(&sender, AuditAction::ReceiveMessage, &message_id)
                        .with_details(json!({ "message_type": message_type })),
                );
                Ok(response)
            }
            Err(error) => {
                self.audit.record(
                    AuditEvent::failure(&sender, AuditAction::ReceiveMessage, &message_id, &error)
                        .with_details(json!({
                            "message_type": message_type,
                            "error": error.message,
                        })),
                );
                Err(error)
            }
        }
    }

    async fn receive(
        &self,
        envelope: MessageEnvelope,
        headers: &InboundHeaders,
    ) -> AppResult<MessageResponse> {
        match headers.bearer_token.as_deref() {
            Some(token) if !token.is_empty() => {}
            _ => return Err(AppError::auth_invalid("Missing bearer token")),
        }
        header_matches("X-Agent-ID", headers.agent_id.as_deref(), &envelope.sender)?;
        header_matches("X-Message-ID", headers.message_id.as_deref(), &envelope.id)?;
        header_matches("X-Nonce", headers.nonce.as_deref(), &envelope.nonce)?;
        if let Some(priority) = headers.priority.as_deref() {
            priority
                .parse::<MessagePriority>()
                .map_err(AppError::validation)?;
        }
        if envelope.recipient != self.config.agent.agent_id {
            return Err(AppError::validation(format!(
                "Envelope is addressed to '{}', not to this agent",
                envelope.recipient
            )));
        }

        // Unsigned traffic must not consume the claimed sender's quota
        self.channel.verify_signature(&envelope)?;
        let status = self.rate_limiter.check(&envelope.sender);
        if !status.allowed {
            return Err(AppError::rate_limit_exceeded(
                &envelope.sender,
                status.limit,
                status.reset_at,
            ));
        }

        Ok(self.channel.receive_message(envelope).await?)
    }

    /// Live session for `session_id`
    #[must_use]
    pub fn validate_session(&self, session_id: &str) -> Option<Session> {
        let session = self.sessions.validate(session_id);
        match &session {
            Some(session) => {
                self.audit.record(AuditEvent::success(
                    &session.client_id,
                    AuditAction::ValidateSession,
                    "session",
                ));
            }
            None => {
                self.audit.record(AuditEvent::failure(
                    "unknown",
                    AuditAction::ValidateSession,
                    "session",
                    &AppError::auth_invalid("Session is unknown or expired"),
                ));
            }
        }
        session
    }

    /// End a session; returns whether it existed
    pub fn end_session(&self, session_id: &str) -> bool {
        let client_id = self
            .sessions
            .validate(session_id)
            .map_or_else(|| "unknown".to_owned(), |session| session.client_id);
        let ended = self.sessions.end(session_id);
        self.audit.record(
            AuditEvent::success(&client_id, AuditAction::EndSession, "session")
                .with_details(json!({ "existed": ended })),
        );
        ended
    }

    /// Aggregates over the audit log
    #[must_use]
    pub fn get_security_metrics(&self) -> SecurityMetrics {
        self.audit.metrics()
    }

    /// Liveness summary of the local service
    pub async fn service_health(&self) -> ServiceHealth {
        let active_connections = self
            .channel
            .list_connections()
            .await
            .iter()
            .filter(|status| status.is_active)
            .count();
        self.sessions.purge_expired();
        ServiceHealth {
            status: "healthy",
            agent_id: self.config.agent.agent_id.clone(),
            active_connections,
            active_tokens: self.tokens.active_token_count(),
            active_sessions: self.sessions.len(),
            certificates_enabled: self.authority.is_some(),
            timestamp: self.clock.now(),
        }
    }
}

fn header_matches(name: &str, header: Option<&str>, expected: &str) -> AppResult<()> {
    match header {
        Some(value) if value != expected => Err(AppError::validation(format!(
            "{name} header does not match the envelope"
        ))),
        _ => Ok(()),
    }
}
