// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # fieldlink-opcua
//!
//! OPC UA client layer of the fieldlink redundant field-bus client.
//!
//! The crate is organized around one seam and four components:
//!
//! - **Transport**: the [`transport::ServerTransport`] trait fronting the
//!   protocol SDK, plus the session event stream
//! - **Security**: certifier strategies and the negotiation over the
//!   server's advertised access points
//! - **Endpoint**: one retry-wrapped session with one server
//! - **Registry**: tag ↔ monitored-item bookkeeping with
//!   sampling-interval groups and stable client handles
//! - **Failover**: the redundant-server controller and client facade
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fieldlink_core::config::ClientConfig;
//! use fieldlink_core::sink::ChannelSink;
//! use fieldlink_opcua::failover::FailoverController;
//! use fieldlink_opcua::security::CertifierSettings;
//!
//! let (sink, mut events) = ChannelSink::with_channel(1024);
//! let controller = FailoverController::new(
//!     ClientConfig::default(),
//!     my_transport_factory,
//!     CertifierSettings::default(),
//!     Arc::new(sink),
//! )?;
//! controller.connect(vec!["opc.tcp://a:4840".into(), "opc.tcp://b:4840".into()]).await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod endpoint;
pub mod failover;
pub mod registry;
pub mod security;
pub mod transport;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use endpoint::Endpoint;
pub use failover::{
    ControllerState, FailoverController, RedundancyMode, TransportFactory,
};
pub use registry::{TagConfig, TagSubscriptionRegistry};
pub use security::{
    AnonymousCertifier, CertificateCertifier, Certifier, CertifierSettings, NegotiatedSession,
    SecurityNegotiator, UserNameCertifier,
};
pub use transport::{
    AccessPoint, Credentials, DataChange, ItemDefinition, ItemStatus, RedundancySupport,
    SecurityMode, ServerTransport, SessionEvent, SubscriptionHandle,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
