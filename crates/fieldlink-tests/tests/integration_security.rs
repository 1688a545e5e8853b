// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Security negotiation integration tests.
//!
//! Exercises the certifier × access-point walk against a scriptable
//! server: strategy fallback, descending security-level order, trust
//! violation aborts and full exhaustion.

use tokio::sync::mpsc;

use fieldlink_core::config::CertifierPriority;
use fieldlink_core::error::{ClientError, CommunicationError, ConfigurationError};
use fieldlink_opcua::security::{CertifierSettings, SecurityNegotiator};
use fieldlink_opcua::transport::{AccessPoint, SecurityMode, SessionEvent};

use fieldlink_tests::common::{init_test_logging, MockServer, MockTransport};

const URI: &str = "opc.tcp://server-a:4840";

fn all_strategy_settings() -> CertifierSettings {
    CertifierSettings {
        user: Some("operator".into()),
        password: Some("secret".into()),
        certificate_path: Some("/certs/client.der".into()),
        private_key_path: Some("/certs/client.key".into()),
    }
}

fn events() -> (mpsc::Sender<SessionEvent>, mpsc::Receiver<SessionEvent>) {
    mpsc::channel(16)
}

#[tokio::test]
async fn test_rejected_certifier_falls_back_to_next_strategy() {
    init_test_logging();

    let server = MockServer::new();
    server.set_access_points(vec![
        AccessPoint::new("Basic256Sha256", SecurityMode::SignAndEncrypt, 110),
        AccessPoint::new("None", SecurityMode::None, 0),
    ]);
    server.reject_strategy("certificate");

    let table = vec![
        CertifierPriority::new("certificate", 1),
        CertifierPriority::new("username", 2),
        CertifierPriority::new("anonymous", 3),
    ];
    let negotiator = SecurityNegotiator::from_table(&table, &all_strategy_settings()).unwrap();

    let (tx, _rx) = events();
    let session = negotiator
        .negotiate(&MockTransport::new(server.clone()), URI, tx)
        .await
        .unwrap();

    assert_eq!(session.strategy, "username");
    assert_eq!(session.point.security_level, 110);

    // One rejected certificate attempt, then the username success.
    let log = server.connect_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].strategy, "certificate");
    assert_eq!(log[1].strategy, "username");
}

#[tokio::test]
async fn test_trust_violation_aborts_after_one_attempt() {
    init_test_logging();

    let server = MockServer::new();
    server.set_access_points(vec![
        AccessPoint::new("Basic256Sha256", SecurityMode::SignAndEncrypt, 110),
        AccessPoint::new("Aes128Sha256", SecurityMode::Sign, 60),
        AccessPoint::new("None", SecurityMode::None, 0),
    ]);
    server.set_trust_violation(true);

    let table = vec![
        CertifierPriority::new("certificate", 1),
        CertifierPriority::new("anonymous", 2),
    ];
    let negotiator = SecurityNegotiator::from_table(&table, &all_strategy_settings()).unwrap();

    let (tx, _rx) = events();
    let result = negotiator
        .negotiate(&MockTransport::new(server.clone()), URI, tx)
        .await;

    // No fallback to other points or certifiers after a trust violation.
    assert!(matches!(
        result,
        Err(ClientError::Configuration(
            ConfigurationError::UntrustedCertificate { .. }
        ))
    ));
    assert_eq!(server.connect_count(), 1);
}

#[tokio::test]
async fn test_access_points_tried_in_descending_security_level() {
    init_test_logging();

    let server = MockServer::new();
    server.set_access_points(vec![
        AccessPoint::new("None", SecurityMode::None, 0),
        AccessPoint::new("Basic256Sha256", SecurityMode::SignAndEncrypt, 110),
        AccessPoint::new("Aes128Sha256", SecurityMode::Sign, 60),
    ]);
    server.set_fail_session_connect(true);

    let table = vec![CertifierPriority::new("anonymous", 1)];
    let negotiator = SecurityNegotiator::from_table(&table, &CertifierSettings::default()).unwrap();

    let (tx, _rx) = events();
    let result = negotiator
        .negotiate(&MockTransport::new(server.clone()), URI, tx)
        .await;

    assert!(matches!(
        result,
        Err(ClientError::Communication(
            CommunicationError::NoAuthenticableEndpoint
        ))
    ));

    let levels: Vec<u8> = server
        .connect_log()
        .iter()
        .map(|attempt| attempt.security_level)
        .collect();
    assert_eq!(levels, vec![110, 60, 0]);
}

#[tokio::test]
async fn test_no_supported_point_exhausts_without_connecting() {
    init_test_logging();

    // Username needs a secured point; the server only offers an open one.
    let server = MockServer::new();
    let table = vec![CertifierPriority::new("username", 1)];
    let negotiator = SecurityNegotiator::from_table(&table, &all_strategy_settings()).unwrap();

    let (tx, _rx) = events();
    let result = negotiator
        .negotiate(&MockTransport::new(server.clone()), URI, tx)
        .await;

    assert!(matches!(
        result,
        Err(ClientError::Communication(
            CommunicationError::NoAuthenticableEndpoint
        ))
    ));
    assert_eq!(server.connect_count(), 0);
}

#[tokio::test]
async fn test_transport_failure_moves_to_next_point_same_certifier() {
    init_test_logging();

    // A transport-level failure on the strongest point must not end the
    // certifier's walk; the open point is still eligible.
    let server = MockServer::new();
    server.set_access_points(vec![
        AccessPoint::new("Basic256Sha256", SecurityMode::SignAndEncrypt, 110),
        AccessPoint::new("None", SecurityMode::None, 0),
    ]);
    server.fail_policy("Basic256Sha256");

    let table = vec![CertifierPriority::new("anonymous", 1)];
    let negotiator = SecurityNegotiator::from_table(&table, &CertifierSettings::default()).unwrap();

    let (tx, _rx) = events();
    let session = negotiator
        .negotiate(&MockTransport::new(server.clone()), URI, tx)
        .await
        .unwrap();

    assert_eq!(session.strategy, "anonymous");
    assert_eq!(session.point.security_level, 0);
    assert_eq!(server.connect_count(), 2);
}
