// ABOUTME: Server binary hosting one agent of the trust fabric
// ABOUTME: Loads configuration, builds the orchestrator and serves the OAuth and A2A routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # A2A Trust Server Binary
//!
//! Starts a single agent: token service, certificate authority and secure
//! channel behind the HTTP endpoints peers talk to.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use a2a_trust_fabric::{
    a2a::HttpTransport,
    certificates::is_valid_agent_id,
    config::FabricConfig,
    logging,
    orchestrator::{AuthOrchestrator, Collaborators},
    routes,
};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "a2a-trust-server")]
#[command(about = "A2A trust fabric - OAuth2, private CA and secure agent channels")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override the local agent id
    #[arg(long)]
    agent_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = FabricConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.agent.http_port = http_port;
    }
    if let Some(agent_id) = args.agent_id {
        ensure!(is_valid_agent_id(&agent_id), "invalid agent id '{agent_id}'");
        config.agent.agent_id = agent_id;
    }

    let transport = HttpTransport::new(config.transport.request_timeout)?;
    let port = config.agent.http_port;
    let orchestrator = Arc::new(
        AuthOrchestrator::initialize(config, Collaborators::new(Arc::new(transport))).await?,
    );
    let cleanup = orchestrator.spawn_cleanup();

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(agent_id = %orchestrator.agent_id(), %addr, "A2A trust server listening");

    let served = axum::serve(listener, routes::router(Arc::clone(&orchestrator)))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    cleanup.stop().await;
    if let Err(e) = served {
        error!("Server error: {e}");
        return Err(e.into());
    }
    info!("A2A trust server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
}
