// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Builders
//!
//! Fast configurations and object construction helpers, so individual
//! tests stay focused on behavior instead of wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use fieldlink_core::config::{CertifierPriority, ClientConfig};
use fieldlink_core::retry::{LinkState, RetryExecutor, RetryPolicy};
use fieldlink_core::shutdown::StopToken;
use fieldlink_core::sink::{ChannelSink, SinkEvent};
use fieldlink_core::types::NodeAddress;
use fieldlink_opcua::endpoint::Endpoint;
use fieldlink_opcua::failover::{ControllerState, FailoverController};
use fieldlink_opcua::registry::TagConfig;
use fieldlink_opcua::security::CertifierSettings;

use super::mocks::{MockNetwork, MockTransport, MockTransportFactory};

/// Timeout for "this should happen promptly" assertions.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// A configuration with millisecond-scale delays so retry and failover
/// paths run in test time.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        max_attempts: 2,
        retry_delay: Duration::from_millis(1),
        call_timeout: Duration::from_millis(200),
        failover_initial_delay: Duration::from_millis(1),
        failover_max_delay: Duration::from_millis(5),
        reconnect_grace: Duration::from_millis(20),
        // Anonymous only; tests supply credential material explicitly when
        // they exercise the other strategies.
        certifiers: vec![CertifierPriority::new("anonymous", 1)],
        ..ClientConfig::default()
    }
}

/// A fast single-attempt retry policy for direct endpoint tests.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(200))
}

/// Builds an endpoint over a mock transport with a fast retry policy.
pub fn mock_endpoint(uri: &str, transport: MockTransport) -> Endpoint<MockTransport> {
    let executor = RetryExecutor::new(fast_policy(), LinkState::new(), StopToken::new());
    Endpoint::new(uri, transport, executor)
}

/// Builds a connected controller over `network` with a channel sink.
///
/// The controller is constructed but not yet connected; callers drive
/// `connect` themselves so failure paths stay testable.
pub fn mock_controller(
    config: ClientConfig,
    network: &Arc<MockNetwork>,
) -> (
    Arc<FailoverController<MockTransportFactory>>,
    mpsc::Receiver<SinkEvent>,
) {
    let (sink, events) = ChannelSink::with_channel(256);
    let controller = FailoverController::new(
        config,
        MockTransportFactory::new(network.clone()),
        CertifierSettings::default(),
        Arc::new(sink),
    )
    .expect("controller construction");
    (controller, events)
}

/// Shorthand for a deadband-free tag config on namespace 2.
pub fn tag(name: &str, node: u32, sampling_ms: u64) -> TagConfig {
    TagConfig::new(
        name,
        NodeAddress::numeric(2, node),
        Duration::from_millis(sampling_ms),
    )
}

/// Receives the next sink event or panics after [`EVENT_TIMEOUT`].
pub async fn next_event(events: &mut mpsc::Receiver<SinkEvent>) -> SinkEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a sink event")
        .expect("sink channel closed")
}

/// Polls until the controller reaches `expected` or the timeout expires.
pub async fn wait_for_state(
    controller: &FailoverController<MockTransportFactory>,
    expected: ControllerState,
) {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    loop {
        if controller.state() == expected {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "controller never reached {:?}, stuck at {:?}",
                expected,
                controller.state()
            );
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
