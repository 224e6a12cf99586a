// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides fast key sizes, channel pairs and orchestrator pairs over a loopback transport
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `a2a_trust_fabric`

use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;

use a2a_trust_fabric::a2a::{
    ChannelConfig, ChannelCredentials, ChannelParts, LoopbackTransport, MessageTransport,
    SecureChannel,
};
use a2a_trust_fabric::certificates::{CertificateAuthority, CertificateAuthorityConfig};
use a2a_trust_fabric::clock::ManualClock;
use a2a_trust_fabric::config::FabricConfig;
use a2a_trust_fabric::crypto::EnvelopeKeys;
use a2a_trust_fabric::oauth2_server::{TokenService, TokenServiceConfig};
use a2a_trust_fabric::orchestrator::{AuthOrchestrator, Collaborators};
use a2a_trust_core::constants::oauth;
use url::Url;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub const SIGNING_SECRET: &str = "test-signing-secret-shared-by-both-agents";
pub const ENCRYPTION_SECRET: &str = "test-encryption-secret-shared-by-both-agents";

/// Smallest key sizes the authority accepts
pub fn fast_ca_config(storage_dir: Option<PathBuf>) -> CertificateAuthorityConfig {
    CertificateAuthorityConfig {
        storage_dir,
        key_size: 2048,
        ca_key_size: 2048,
        ..CertificateAuthorityConfig::default()
    }
}

pub async fn authority(clock: &ManualClock) -> Arc<CertificateAuthority> {
    Arc::new(
        CertificateAuthority::initialize(fast_ca_config(None), clock.shared())
            .await
            .unwrap(),
    )
}

pub fn token_service(clock: &ManualClock) -> Arc<TokenService> {
    let config = TokenServiceConfig::with_issuer(Url::parse("http://localhost:8090").unwrap());
    TokenService::new(config, clock.shared()).into_shared()
}

/// No retry pauses so failure paths finish quickly
pub fn quick_channel_config() -> ChannelConfig {
    ChannelConfig {
        request_timeout: Duration::from_secs(5),
        retry_count: 1,
        retry_delay: Duration::from_millis(1),
        ..ChannelConfig::default()
    }
}

/// Channel for `agent_id` with its own token service and OAuth client
pub fn channel(
    agent_id: &str,
    clock: &ManualClock,
    transport: &Arc<LoopbackTransport>,
    authority: Option<Arc<CertificateAuthority>>,
) -> Arc<SecureChannel> {
    let tokens = token_service(clock);
    let redirect_uri = format!("https://{agent_id}.example/a2a/callback");
    let registration = tokens
        .register_client(
            agent_id,
            vec![redirect_uri.clone()],
            Some(oauth::ALLOWED_SCOPES.iter().map(|s| (*s).to_owned()).collect()),
            None,
        )
        .unwrap();

    let delivery: Arc<dyn MessageTransport> = transport.clone();
    let channel = Arc::new(SecureChannel::new(ChannelParts {
        credentials: ChannelCredentials {
            agent_id: agent_id.to_owned(),
            client_id: registration.client.client_id,
            client_secret: registration.client_secret,
            redirect_uri,
        },
        config: quick_channel_config(),
        tokens,
        authority,
        keys: EnvelopeKeys::from_secrets(SIGNING_SECRET, ENCRYPTION_SECRET),
        transport: delivery,
        clock: clock.shared(),
    }));
    transport.connect(&channel);
    channel
}

/// Development configuration with fast keys and no retry pauses
pub fn fabric_config(agent_id: &str, certificates: bool) -> FabricConfig {
    let base_url = Url::parse(&format!("https://{agent_id}.example")).unwrap();
    let mut config = FabricConfig::development(agent_id, base_url).unwrap();
    config.security.enable_certificates = certificates;
    config.certificates = fast_ca_config(None);
    config.transport.retry_count = 1;
    config.transport.retry_delay = Duration::from_millis(1);
    config.crypto.signing_key = SIGNING_SECRET.to_owned();
    config.crypto.encryption_key = ENCRYPTION_SECRET.to_owned();
    config
}

/// Orchestrator for `config` wired into `transport`
pub async fn orchestrator(
    config: FabricConfig,
    clock: &ManualClock,
    transport: &Arc<LoopbackTransport>,
) -> Arc<AuthOrchestrator> {
    let delivery: Arc<dyn MessageTransport> = transport.clone();
    let collaborators = Collaborators::new(delivery).with_clock(clock.shared());
    let orchestrator = Arc::new(AuthOrchestrator::initialize(config, collaborators).await.unwrap());
    transport.connect(orchestrator.channel());
    orchestrator
}

/// Agent A and agent B talking over one loopback transport
pub async fn orchestrator_pair(
    clock: &ManualClock,
    certificates: bool,
) -> (Arc<AuthOrchestrator>, Arc<AuthOrchestrator>) {
    let transport = Arc::new(LoopbackTransport::new());
    let a = orchestrator(fabric_config("agent-a", certificates), clock, &transport).await;
    let b = orchestrator(fabric_config("agent-b", certificates), clock, &transport).await;
    (a, b)
}
