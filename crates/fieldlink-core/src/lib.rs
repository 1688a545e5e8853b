// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # fieldlink-core
//!
//! Core abstractions for the fieldlink redundant field-bus client.
//!
//! This crate provides the foundation the protocol crates build on:
//!
//! - **Types**: `TagId`, `NodeAddress`, `Value`, `Quality`, `DataPoint`
//! - **Error**: Unified error taxonomy split by how failures are handled
//! - **Config**: Client configuration with serde support and validation
//! - **Retry**: Bounded retry execution with failure classification and
//!   the long-lost-connection fast fail
//! - **Shutdown**: Cooperative stop signalling honored inside retry loops
//! - **Sink**: Outward delivery of data batches and state transitions
//!
//! ## Example
//!
//! ```rust,ignore
//! use fieldlink_core::config::ClientConfig;
//! use fieldlink_core::retry::{LinkState, OperationKind, RetryExecutor};
//! use fieldlink_core::shutdown::StopToken;
//!
//! let config = ClientConfig::default();
//! let executor = RetryExecutor::new(
//!     config.retry_policy(),
//!     LinkState::new(),
//!     StopToken::new(),
//! );
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod config;
pub mod error;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod types;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use config::{CertifierPriority, ClientConfig, ClientConfigBuilder, RedundancyOverride};
pub use error::{
    ClientError, ClientResult, CommunicationError, ConfigurationError, SecurityError,
};
pub use retry::{
    FailoverBackoff, LinkState, OperationKind, RetryExecutor, RetryPolicy, RetryStats,
};
pub use shutdown::StopToken;
pub use sink::{BroadcastSink, ChannelSink, EventSink, SinkEvent};
pub use types::{
    DataPoint, Deadband, DeadbandKind, EquipmentState, NodeAddress, NodeIdentifier, Quality, TagId,
    Value,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
