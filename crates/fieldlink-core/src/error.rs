// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the fieldlink client.
//!
//! The taxonomy mirrors how failures are handled, not where they occur:
//!
//! ```text
//! ClientError
//! ├── Configuration - non-retryable; the request itself is wrong
//! ├── Communication - retryable network/protocol failures
//! ├── Security      - negotiation outcomes (severe vs. trust violation)
//! └── Stopped       - intentional shutdown observed mid-operation
//! ```
//!
//! `Communication` carries the special `LongLostConnection` variant which is
//! raised *instead of* further retries once the elapsed disconnection time
//! exceeds what a full retry budget could bridge.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias for results in this crate family.
pub type ClientResult<T> = Result<T, ClientError>;

// =============================================================================
// ClientError - Main Error Type
// =============================================================================

/// The main error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration/semantic problems. Never retried.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Network/protocol failures. Candidates for retry.
    #[error("{0}")]
    Communication(#[from] CommunicationError),

    /// Security negotiation failures.
    #[error("{0}")]
    Security(#[from] SecurityError),

    /// The client was intentionally shut down while the operation was
    /// pending. Callers treat this as a no-op, not a failure.
    #[error("client stopped")]
    Stopped,
}

impl ClientError {
    // =========================================================================
    // Convenience Factory Methods
    // =========================================================================

    /// Creates a connect-failed error.
    pub fn connect_failed(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Communication(CommunicationError::connect_failed(uri, message))
    }

    /// Creates a request-failed error.
    pub fn request_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Communication(CommunicationError::request_failed(operation, message))
    }

    /// Creates an operation timeout error.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Communication(CommunicationError::Timeout {
            operation: operation.into(),
            duration,
        })
    }

    /// Creates an invalid-address configuration error.
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration(ConfigurationError::invalid_address(address, reason))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if a subsequent attempt may succeed.
    ///
    /// Configuration and security errors require operator intervention;
    /// `LongLostConnection` explicitly forbids further retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Communication(e) => e.is_retryable(),
            Self::Configuration(_) | Self::Security(_) | Self::Stopped => false,
        }
    }

    /// Returns `true` if this is a configuration-class error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns `true` if the client was shut down mid-operation.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Communication(_) => "communication",
            Self::Security(_) => "security",
            Self::Stopped => "stopped",
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Non-retryable errors caused by bad input or bad configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A node address string could not be parsed.
    #[error("invalid node address '{address}': {reason}")]
    InvalidAddress {
        /// The offending address string.
        address: String,
        /// Why parsing failed.
        reason: String,
    },

    /// `subscribe_tags` was called with an empty tag set.
    #[error("cannot subscribe an empty tag set")]
    EmptyTagSet,

    /// A command type has no known mapping.
    #[error("unknown command type '{command}'")]
    UnknownCommand {
        /// The unrecognized command name.
        command: String,
    },

    /// The server certificate (or ours, from the server's view) is not
    /// trusted. Retrying cannot help; the trust store must change.
    #[error("certificate not trusted: {thumbprint}")]
    UntrustedCertificate {
        /// Certificate thumbprint for diagnostics.
        thumbprint: String,
    },

    /// A method node has no parent object to invoke it on.
    #[error("method node '{node}' has no parent object")]
    OrphanMethodNode {
        /// The orphaned method node address.
        node: String,
    },

    /// `recreate_subscription` was asked to restore a handle that maps to
    /// no group, or to a group with no members.
    #[error("subscription handle {handle} maps to an empty or unknown group")]
    EmptySubscriptionGroup {
        /// The stale subscription handle.
        handle: u32,
    },

    /// A configuration field failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid-address error.
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown-command error.
    pub fn unknown_command(command: impl Into<String>) -> Self {
        Self::UnknownCommand {
            command: command.into(),
        }
    }

    /// Creates an untrusted-certificate error.
    pub fn untrusted_certificate(thumbprint: impl Into<String>) -> Self {
        Self::UntrustedCertificate {
            thumbprint: thumbprint.into(),
        }
    }

    /// Creates an orphan-method-node error.
    pub fn orphan_method_node(node: impl fmt::Display) -> Self {
        Self::OrphanMethodNode {
            node: node.to_string(),
        }
    }

    /// Creates an invalid-value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// CommunicationError
// =============================================================================

/// Retryable network and protocol failures.
#[derive(Debug, Error)]
pub enum CommunicationError {
    /// Could not reach or handshake with the server.
    #[error("failed to connect to '{uri}': {message}")]
    ConnectFailed {
        /// Target server URI.
        uri: String,
        /// Failure detail.
        message: String,
    },

    /// A service request failed on an established session.
    #[error("{operation} failed: {message}")]
    RequestFailed {
        /// Operation name.
        operation: String,
        /// Failure detail.
        message: String,
    },

    /// The per-call timeout elapsed.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// Operation name.
        operation: String,
        /// Configured timeout.
        duration: Duration,
    },

    /// The session was closed underneath us.
    #[error("session closed: {reason}")]
    SessionClosed {
        /// Close reason, if the server said.
        reason: String,
    },

    /// No server in the redundant set could be reached at all.
    #[error("no redundant server available")]
    NoRedundantServer,

    /// Every certifier/access-point combination was exhausted.
    #[error("no authenticable endpoint on server")]
    NoAuthenticableEndpoint,

    /// The client has been disconnected longer than a full retry budget
    /// could plausibly bridge. Raised instead of burning through retries.
    #[error("connection lost for {disconnected_for:?}, exceeding the retry budget")]
    LongLostConnection {
        /// How long the client has been disconnected.
        disconnected_for: Duration,
    },
}

impl CommunicationError {
    /// Creates a connect-failed error.
    pub fn connect_failed(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Creates a request-failed error.
    pub fn request_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a session-closed error.
    pub fn session_closed(reason: impl Into<String>) -> Self {
        Self::SessionClosed {
            reason: reason.into(),
        }
    }

    /// Creates a long-lost-connection error.
    pub fn long_lost(disconnected_for: Duration) -> Self {
        Self::LongLostConnection { disconnected_for }
    }

    /// Returns `true` if a subsequent attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::LongLostConnection { .. })
    }
}

// =============================================================================
// SecurityError
// =============================================================================

/// Outcomes of a failed authentication attempt during negotiation.
///
/// The distinction drives the negotiator: a rejection moves on to the next
/// certifier, a trust violation aborts the whole negotiation.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// The server rejected this credential type outright. The certifier
    /// fundamentally cannot satisfy this server; try the next one.
    #[error("authentication rejected for '{strategy}': {message}")]
    AuthenticationRejected {
        /// Certifier strategy name.
        strategy: String,
        /// Server-reported detail.
        message: String,
    },

    /// A certificate in the exchange is untrusted. No certifier can fix
    /// this; the negotiation aborts.
    #[error("untrusted certificate: {thumbprint}")]
    UntrustedCertificate {
        /// Certificate thumbprint for diagnostics.
        thumbprint: String,
    },
}

impl SecurityError {
    /// Creates an authentication-rejected error.
    pub fn authentication_rejected(
        strategy: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AuthenticationRejected {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    /// Creates an untrusted-certificate error.
    pub fn untrusted_certificate(thumbprint: impl Into<String>) -> Self {
        Self::UntrustedCertificate {
            thumbprint: thumbprint.into(),
        }
    }

    /// Returns `true` if this failure invalidates the whole negotiation
    /// rather than just the current certifier.
    pub fn is_trust_violation(&self) -> bool {
        matches!(self, Self::UntrustedCertificate { .. })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let comm = ClientError::request_failed("read", "boom");
        assert!(comm.is_retryable());

        let config = ClientError::from(ConfigurationError::EmptyTagSet);
        assert!(!config.is_retryable());
        assert!(config.is_configuration());

        let long_lost =
            ClientError::Communication(CommunicationError::long_lost(Duration::from_secs(60)));
        assert!(!long_lost.is_retryable());

        assert!(!ClientError::Stopped.is_retryable());
        assert!(ClientError::Stopped.is_stopped());
    }

    #[test]
    fn test_security_trust_violation() {
        let rejected = SecurityError::authentication_rejected("username", "bad password");
        assert!(!rejected.is_trust_violation());

        let untrusted = SecurityError::untrusted_certificate("ab:cd:ef");
        assert!(untrusted.is_trust_violation());

        let wrapped = ClientError::from(untrusted);
        assert!(!wrapped.is_retryable());
        assert_eq!(wrapped.category(), "security");
    }

    #[test]
    fn test_display_messages() {
        let err = ClientError::invalid_address("ns=x;s=", "missing namespace index");
        assert!(err.to_string().contains("ns=x;s="));

        let err = ClientError::timeout("write", Duration::from_millis(250));
        assert!(err.to_string().contains("write"));
    }
}
