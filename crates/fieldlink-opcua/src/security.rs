// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Security negotiation.
//!
//! Servers advertise several access points at different security levels;
//! the client carries an ordered table of credential strategies
//! ("certifiers"). The negotiator walks certifiers by priority and, within
//! each, access points by descending security level, until a session
//! activates.
//!
//! Failure handling is the whole point of the walk:
//! - a transport failure moves to the next access point, same certifier
//! - an authentication rejection moves to the next certifier
//! - an untrusted certificate aborts the negotiation outright, because no
//!   credential can repair a trust store

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fieldlink_core::config::CertifierPriority;
use fieldlink_core::error::{
    ClientError, ClientResult, CommunicationError, ConfigurationError, SecurityError,
};

use crate::transport::{AccessPoint, Credentials, ServerTransport, SessionEvent};

// =============================================================================
// Certifier
// =============================================================================

/// One credential strategy.
#[async_trait]
pub trait Certifier: Send + Sync {
    /// Strategy name matching the config table.
    fn name(&self) -> &'static str;

    /// Returns `true` when this strategy can be used on the given access
    /// point.
    fn supports(&self, point: &AccessPoint) -> bool;

    /// The credentials to activate a session with.
    fn credentials(&self) -> Credentials;
}

/// No identity; accepted by servers that allow anonymous sessions.
#[derive(Debug, Default)]
pub struct AnonymousCertifier;

#[async_trait]
impl Certifier for AnonymousCertifier {
    fn name(&self) -> &'static str {
        "anonymous"
    }

    fn supports(&self, _point: &AccessPoint) -> bool {
        true
    }

    fn credentials(&self) -> Credentials {
        Credentials::Anonymous
    }
}

/// User name and password. The password travels inside the session
/// activation, so only secured access points are eligible.
#[derive(Debug)]
pub struct UserNameCertifier {
    user: String,
    password: String,
}

impl UserNameCertifier {
    /// Creates a user-name certifier.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl Certifier for UserNameCertifier {
    fn name(&self) -> &'static str {
        "username"
    }

    fn supports(&self, point: &AccessPoint) -> bool {
        point.is_secured()
    }

    fn credentials(&self) -> Credentials {
        Credentials::UserName {
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}

/// X.509 client certificate; requires a secured access point.
#[derive(Debug)]
pub struct CertificateCertifier {
    certificate_path: String,
    private_key_path: String,
}

impl CertificateCertifier {
    /// Creates a certificate certifier.
    pub fn new(certificate_path: impl Into<String>, private_key_path: impl Into<String>) -> Self {
        Self {
            certificate_path: certificate_path.into(),
            private_key_path: private_key_path.into(),
        }
    }
}

#[async_trait]
impl Certifier for CertificateCertifier {
    fn name(&self) -> &'static str {
        "certificate"
    }

    fn supports(&self, point: &AccessPoint) -> bool {
        point.is_secured()
    }

    fn credentials(&self) -> Credentials {
        Credentials::Certificate {
            certificate_path: self.certificate_path.clone(),
            private_key_path: self.private_key_path.clone(),
        }
    }
}

// =============================================================================
// Certifier Settings & Registry
// =============================================================================

/// Credential material for the built-in certifiers.
#[derive(Debug, Clone, Default)]
pub struct CertifierSettings {
    /// Login name for the `username` strategy.
    pub user: Option<String>,
    /// Password for the `username` strategy.
    pub password: Option<String>,
    /// Certificate path for the `certificate` strategy.
    pub certificate_path: Option<String>,
    /// Private key path for the `certificate` strategy.
    pub private_key_path: Option<String>,
}

/// Resolves the config priority table against the compile-time set of
/// known strategies. The table's priority order is preserved; strategies
/// without the required settings are rejected rather than silently
/// skipped.
pub fn build_certifiers(
    table: &[CertifierPriority],
    settings: &CertifierSettings,
) -> ClientResult<Vec<Arc<dyn Certifier>>> {
    let mut ordered = table.to_vec();
    ordered.sort_by_key(|entry| entry.priority);

    let mut certifiers: Vec<Arc<dyn Certifier>> = Vec::with_capacity(ordered.len());
    for entry in &ordered {
        let certifier: Arc<dyn Certifier> = match entry.strategy.as_str() {
            "anonymous" => Arc::new(AnonymousCertifier),
            "username" => {
                let (user, password) = match (&settings.user, &settings.password) {
                    (Some(u), Some(p)) => (u.clone(), p.clone()),
                    _ => {
                        return Err(ConfigurationError::invalid_value(
                            "certifiers",
                            "strategy 'username' requires user and password settings",
                        )
                        .into())
                    }
                };
                Arc::new(UserNameCertifier::new(user, password))
            }
            "certificate" => {
                let (cert, key) = match (&settings.certificate_path, &settings.private_key_path) {
                    (Some(c), Some(k)) => (c.clone(), k.clone()),
                    _ => {
                        return Err(ConfigurationError::invalid_value(
                            "certifiers",
                            "strategy 'certificate' requires certificate and key paths",
                        )
                        .into())
                    }
                };
                Arc::new(CertificateCertifier::new(cert, key))
            }
            other => {
                return Err(ConfigurationError::invalid_value(
                    "certifiers",
                    format!("unknown strategy '{other}'"),
                )
                .into())
            }
        };
        certifiers.push(certifier);
    }

    Ok(certifiers)
}

// =============================================================================
// SecurityNegotiator
// =============================================================================

/// Outcome of a successful negotiation.
#[derive(Debug, Clone)]
pub struct NegotiatedSession {
    /// The access point the session is bound to.
    pub point: AccessPoint,

    /// Name of the certifier that succeeded.
    pub strategy: &'static str,
}

/// Walks the certifier × access-point space until a session activates.
pub struct SecurityNegotiator {
    certifiers: Vec<Arc<dyn Certifier>>,
}

impl SecurityNegotiator {
    /// Creates a negotiator over an ordered certifier list.
    pub fn new(certifiers: Vec<Arc<dyn Certifier>>) -> Self {
        Self { certifiers }
    }

    /// Builds a negotiator from the config table.
    pub fn from_table(
        table: &[CertifierPriority],
        settings: &CertifierSettings,
    ) -> ClientResult<Self> {
        Ok(Self::new(build_certifiers(table, settings)?))
    }

    /// Negotiates a session on `transport`.
    ///
    /// Discovery runs once; the resulting access points are tried in
    /// descending security level for each certifier in priority order.
    pub async fn negotiate<T>(
        &self,
        transport: &T,
        uri: &str,
        events: mpsc::Sender<SessionEvent>,
    ) -> ClientResult<NegotiatedSession>
    where
        T: ServerTransport + ?Sized,
    {
        let mut points = transport.discover_access_points(uri).await?;
        points.sort_by(|a, b| b.security_level.cmp(&a.security_level));

        for certifier in &self.certifiers {
            let credentials = certifier.credentials();

            'points: for point in points.iter().filter(|p| certifier.supports(p)) {
                debug!(
                    uri,
                    strategy = certifier.name(),
                    policy = %point.policy,
                    level = point.security_level,
                    "attempting session activation"
                );

                match transport
                    .connect(uri, point, &credentials, events.clone())
                    .await
                {
                    Ok(()) => {
                        info!(
                            uri,
                            strategy = certifier.name(),
                            policy = %point.policy,
                            level = point.security_level,
                            "session activated"
                        );
                        return Ok(NegotiatedSession {
                            point: point.clone(),
                            strategy: certifier.name(),
                        });
                    }
                    Err(ClientError::Security(error)) if error.is_trust_violation() => {
                        warn!(uri, error = %error, "trust violation, aborting negotiation");
                        let thumbprint = match error {
                            SecurityError::UntrustedCertificate { thumbprint } => thumbprint,
                            _ => String::new(),
                        };
                        return Err(
                            ConfigurationError::untrusted_certificate(thumbprint).into()
                        );
                    }
                    Err(ClientError::Security(error)) => {
                        // The server refuses this credential kind; no other
                        // access point will change that.
                        debug!(
                            uri,
                            strategy = certifier.name(),
                            error = %error,
                            "certifier rejected, moving to next strategy"
                        );
                        break 'points;
                    }
                    Err(error) => {
                        debug!(
                            uri,
                            strategy = certifier.name(),
                            policy = %point.policy,
                            error = %error,
                            "access point failed, trying next"
                        );
                    }
                }
            }
        }

        Err(CommunicationError::NoAuthenticableEndpoint.into())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SecurityMode;

    #[test]
    fn test_username_certifier_requires_secured_point() {
        let certifier = UserNameCertifier::new("op", "secret");
        assert!(!certifier.supports(&AccessPoint::new("None", SecurityMode::None, 0)));
        assert!(certifier.supports(&AccessPoint::new(
            "Basic256Sha256",
            SecurityMode::SignAndEncrypt,
            110
        )));
    }

    #[test]
    fn test_anonymous_supports_everything() {
        let certifier = AnonymousCertifier;
        assert!(certifier.supports(&AccessPoint::new("None", SecurityMode::None, 0)));
        assert!(certifier.supports(&AccessPoint::new("Aes256", SecurityMode::Sign, 60)));
    }

    #[test]
    fn test_build_certifiers_respects_priority_order() {
        let table = vec![
            CertifierPriority::new("anonymous", 9),
            CertifierPriority::new("username", 1),
        ];
        let settings = CertifierSettings {
            user: Some("op".into()),
            password: Some("secret".into()),
            ..Default::default()
        };

        let certifiers = build_certifiers(&table, &settings).unwrap();
        assert_eq!(certifiers[0].name(), "username");
        assert_eq!(certifiers[1].name(), "anonymous");
    }

    #[test]
    fn test_build_certifiers_rejects_unknown_and_incomplete() {
        let unknown = vec![CertifierPriority::new("kerberos", 1)];
        assert!(build_certifiers(&unknown, &CertifierSettings::default()).is_err());

        let incomplete = vec![CertifierPriority::new("username", 1)];
        assert!(build_certifiers(&incomplete, &CertifierSettings::default()).is_err());
    }
}
