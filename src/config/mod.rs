// ABOUTME: Configuration module for the trust fabric server
// ABOUTME: Environment-driven settings for every component
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Configuration module
//!
//! - **Environment**: `FabricConfig::from_env` and its per-component sections

/// Environment and server configuration
pub mod environment;

pub use environment::{
    AgentConfig, CryptoConfig, FabricConfig, OAuthConfig, SecurityPolicy, TransportConfig,
};
