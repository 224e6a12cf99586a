// ABOUTME: Core types and constants for the A2A trust fabric
// ABOUTME: Foundation crate with error handling and protocol constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # A2A Trust Core
//!
//! Foundation crate providing the shared error taxonomy and protocol constants
//! for the agent-to-agent trust fabric. It changes infrequently, which keeps
//! incremental builds of the main crate cheap.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError`, `ErrorCode` and `ErrorCategory`
//! - **constants**: Scopes, grant types, header names and endpoint paths

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Protocol constants organized by domain
pub mod constants;

pub use errors::{AppError, AppResult, ErrorCategory, ErrorCode};
