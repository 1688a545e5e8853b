// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The transport seam.
//!
//! [`ServerTransport`] is the boundary between this crate and the protocol
//! SDK: everything above it (endpoint, registry, failover) is SDK-agnostic
//! and testable against mocks. One transport instance represents one
//! potential session with one server.
//!
//! Session and data-change events flow back through the [`SessionEvent`]
//! sender handed over at connect time, so the transport never calls into
//! client state directly.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use fieldlink_core::error::ClientResult;
use fieldlink_core::types::{Deadband, NodeAddress, Quality, TagId, Value};

// =============================================================================
// Security Surface
// =============================================================================

/// Message security mode of an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No signing or encryption.
    None,
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

/// One server-advertised session endpoint with its security properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    /// Security policy URI suffix (e.g. `Basic256Sha256`, `None`).
    pub policy: String,

    /// Message security mode.
    pub mode: SecurityMode,

    /// Server-assigned relative strength, higher is stronger.
    pub security_level: u8,
}

impl AccessPoint {
    /// Creates an access point.
    pub fn new(policy: impl Into<String>, mode: SecurityMode, security_level: u8) -> Self {
        Self {
            policy: policy.into(),
            mode,
            security_level,
        }
    }

    /// Returns `true` when the point applies any message security.
    pub fn is_secured(&self) -> bool {
        self.mode != SecurityMode::None
    }
}

/// Credentials offered by a certifier for session activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No identity.
    Anonymous,
    /// User name and password.
    UserName {
        /// Login name.
        user: String,
        /// Password, sent only over secured points.
        password: String,
    },
    /// X.509 client certificate.
    Certificate {
        /// Path to the DER/PEM certificate.
        certificate_path: String,
        /// Path to the matching private key.
        private_key_path: String,
    },
}

impl Credentials {
    /// Stable name of the credential kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::UserName { .. } => "username",
            Self::Certificate { .. } => "certificate",
        }
    }
}

// =============================================================================
// Redundancy
// =============================================================================

/// Server-advertised redundancy support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedundancySupport {
    /// Standalone server.
    None,
    /// Cold redundancy; only one server active at a time.
    Cold,
    /// Warm redundancy.
    Warm,
    /// Hot redundancy.
    Hot,
    /// Failover handled transparently by the server set.
    Transparent,
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Server-assigned identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u32);

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Everything needed to create one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDefinition {
    /// The tag this item feeds.
    pub tag: TagId,

    /// Client-chosen handle; stable for the life of the tag, across
    /// resubscribes and server switches.
    pub client_handle: u32,

    /// Node to monitor.
    pub address: NodeAddress,

    /// Requested sampling interval (already clamped by the registry).
    pub sampling_interval: Duration,

    /// Change filter.
    pub deadband: Deadband,
}

/// Per-item outcome of a batch create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStatus {
    /// The client handle the status refers to.
    pub client_handle: u32,

    /// Raw protocol status word.
    pub status_code: u32,
}

impl ItemStatus {
    /// Creates a good status.
    pub fn good(client_handle: u32) -> Self {
        Self {
            client_handle,
            status_code: 0,
        }
    }

    /// Creates a bad status.
    pub fn bad(client_handle: u32, status_code: u32) -> Self {
        Self {
            client_handle,
            status_code,
        }
    }

    /// Returns `true` when the item was accepted.
    pub fn is_good(&self) -> bool {
        Quality::from_status(self.status_code).is_good()
    }
}

// =============================================================================
// Session Events
// =============================================================================

/// A single data-change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChange {
    /// Client handle of the monitored item.
    pub client_handle: u32,

    /// The new value.
    pub value: Value,

    /// Quality derived from the item's status word.
    pub quality: Quality,

    /// Server timestamp of the change.
    pub timestamp: DateTime<Utc>,
}

/// Push events from the transport, delivered on the sender handed to
/// [`ServerTransport::connect`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session (re)activated.
    Activated,
    /// The session went inactive; the SDK may still reconnect it.
    Deactivated,
    /// A monitored item changed.
    DataChange(DataChange),
    /// A subscription could not be transferred to a reconnected session
    /// and must be recreated.
    TransferFailed(SubscriptionHandle),
}

// =============================================================================
// ServerTransport
// =============================================================================

/// Protocol operations against one server.
///
/// Implementations do not retry and do not time out; both are applied by
/// the endpoint wrapping them. Calls are serialized by the endpoint, so
/// `&self` methods may assume no concurrent protocol traffic.
#[async_trait]
pub trait ServerTransport: Send + Sync {
    /// Lists the server's session endpoints with their security settings.
    async fn discover_access_points(&self, uri: &str) -> ClientResult<Vec<AccessPoint>>;

    /// Connects and activates a session on the given access point.
    ///
    /// `events` receives session and data-change notifications until the
    /// session is closed.
    async fn connect(
        &self,
        uri: &str,
        point: &AccessPoint,
        credentials: &Credentials,
        events: mpsc::Sender<SessionEvent>,
    ) -> ClientResult<()>;

    /// Closes the session. Idempotent.
    async fn close(&self) -> ClientResult<()>;

    /// Reads a node's value attribute.
    async fn read(&self, address: &NodeAddress) -> ClientResult<(Value, Quality)>;

    /// Writes a node's value attribute. Returns the server's accept flag.
    async fn write(&self, address: &NodeAddress, value: Value) -> ClientResult<bool>;

    /// Calls a method on an object node.
    async fn call_method(
        &self,
        object: &NodeAddress,
        method: &NodeAddress,
        args: Vec<Value>,
    ) -> ClientResult<(bool, Vec<Value>)>;

    /// Resolves the parent object of a node, if it has one.
    async fn browse_parent(&self, node: &NodeAddress) -> ClientResult<Option<NodeAddress>>;

    /// Creates a subscription with the given publish interval.
    async fn create_subscription(
        &self,
        publish_interval: Duration,
    ) -> ClientResult<SubscriptionHandle>;

    /// Deletes a subscription and all its items.
    async fn delete_subscription(&self, handle: SubscriptionHandle) -> ClientResult<()>;

    /// Creates monitored items in one batch. Returns one status per
    /// definition, in order.
    async fn create_items(
        &self,
        handle: SubscriptionHandle,
        definitions: &[ItemDefinition],
    ) -> ClientResult<Vec<ItemStatus>>;

    /// Deletes one monitored item.
    async fn delete_item(&self, handle: SubscriptionHandle, client_handle: u32)
        -> ClientResult<()>;

    /// Returns `true` when the subscription is still live on the current
    /// session (i.e. survived any session transfer).
    async fn subscription_current(&self, handle: SubscriptionHandle) -> ClientResult<bool>;

    /// Queries the server's advertised redundancy support.
    async fn redundancy_support(&self) -> ClientResult<RedundancySupport>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_point_security() {
        let open = AccessPoint::new("None", SecurityMode::None, 0);
        assert!(!open.is_secured());

        let secured = AccessPoint::new("Basic256Sha256", SecurityMode::SignAndEncrypt, 110);
        assert!(secured.is_secured());
    }

    #[test]
    fn test_item_status_classification() {
        assert!(ItemStatus::good(1).is_good());
        assert!(!ItemStatus::bad(1, 0x8000_0000).is_good());
    }

    #[test]
    fn test_credentials_kind() {
        assert_eq!(Credentials::Anonymous.kind(), "anonymous");
        let user = Credentials::UserName {
            user: "op".into(),
            password: "secret".into(),
        };
        assert_eq!(user.kind(), "username");
    }
}
