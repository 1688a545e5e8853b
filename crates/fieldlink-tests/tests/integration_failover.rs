// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Failover controller integration tests.
//!
//! Exercises health-based server selection, cold-failover switching with
//! subscription replay, the single-flight switch guard, the reconnect
//! grace timer and redundancy-mode resolution, all over a scriptable
//! two-server network.

use std::time::Duration;

use fieldlink_core::error::{ClientError, CommunicationError};
use fieldlink_core::sink::SinkEvent;
use fieldlink_core::types::{EquipmentState, Quality, Value};
use fieldlink_opcua::failover::{service_level_node, ControllerState, RedundancyMode};
use fieldlink_opcua::transport::{DataChange, RedundancySupport, SessionEvent};

use fieldlink_tests::common::{
    fast_config, init_test_logging, mock_controller, next_event, tag, wait_for_state, MockNetwork,
};

const URI_A: &str = "opc.tcp://server-a:4840";
const URI_B: &str = "opc.tcp://server-b:4840";

fn candidates() -> Vec<String> {
    vec![URI_A.to_string(), URI_B.to_string()]
}

#[tokio::test]
async fn test_unreachable_candidate_skipped_for_healthy_one() {
    init_test_logging();

    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    let server_b = network.add_server(URI_B);
    server_a.set_reachable(false);

    let (controller, mut events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();

    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_B));
    assert_eq!(controller.state(), ControllerState::Connected(URI_B.into()));
    assert_eq!(next_event(&mut events).await, SinkEvent::EquipmentState(EquipmentState::Ok));
    assert!(server_b.connect_count() >= 1);

    controller.stop().await;
}

#[tokio::test]
async fn test_first_healthy_candidate_wins_over_degraded_one() {
    init_test_logging();

    // A answers but is degraded; B is at full health. The healthy-level
    // threshold (200) decides, not candidate order.
    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    network.add_server(URI_B);
    server_a.set_service_level(100);

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();

    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_B));

    controller.stop().await;
}

#[tokio::test]
async fn test_best_degraded_candidate_used_when_none_healthy() {
    init_test_logging();

    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    let server_b = network.add_server(URI_B);
    server_a.set_service_level(150);
    server_b.set_service_level(100);

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();

    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_A));

    controller.stop().await;
}

#[tokio::test]
async fn test_failing_health_read_yields_to_readable_candidate() {
    init_test_logging();

    // A's session comes up but every request fails, the health read
    // included; a candidate whose level cannot be read counts as level 0.
    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    network.add_server(URI_B);
    server_a.set_fail_requests(true);

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();

    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_B));
    assert!(server_a.read_count() >= 1);

    controller.stop().await;
}

#[tokio::test]
async fn test_no_reachable_server_reports_connection_failed() {
    init_test_logging();

    let network = MockNetwork::new();
    network.add_server(URI_A).set_reachable(false);
    network.add_server(URI_B).set_reachable(false);

    let (controller, mut events) = mock_controller(fast_config(), &network);
    let result = controller.connect(candidates()).await;

    assert!(matches!(
        result,
        Err(ClientError::Communication(
            CommunicationError::NoRedundantServer
        ))
    ));
    assert_eq!(controller.state(), ControllerState::Exhausted);
    assert_eq!(
        next_event(&mut events).await,
        SinkEvent::EquipmentState(EquipmentState::ConnectionFailed)
    );

    controller.stop().await;
}

#[tokio::test]
async fn test_switch_replays_subscriptions_with_stable_handles() {
    init_test_logging();

    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    let server_b = network.add_server(URI_B);

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();
    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_A));

    controller
        .subscribe_tags(vec![tag("line1.temp", 1001, 250), tag("line1.speed", 1002, 250)])
        .await
        .unwrap();

    let mut original: Vec<(String, u32)> = server_a
        .created_items()
        .iter()
        .flat_map(|(_, defs)| defs.iter())
        .filter(|def| !def.tag.as_str().starts_with("__diag"))
        .map(|def| (def.tag.as_str().to_string(), def.client_handle))
        .collect();
    original.sort();
    assert_eq!(original.len(), 2);

    assert!(controller.switch_servers().await.unwrap());
    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_B));
    assert_eq!(controller.state(), ControllerState::Connected(URI_B.into()));

    let mut replayed: Vec<(String, u32)> = server_b
        .created_items()
        .iter()
        .flat_map(|(_, defs)| defs.iter())
        .filter(|def| !def.tag.as_str().starts_with("__diag"))
        .map(|def| (def.tag.as_str().to_string(), def.client_handle))
        .collect();
    replayed.sort();

    assert_eq!(original, replayed);

    controller.stop().await;
}

#[tokio::test]
async fn test_concurrent_switch_triggers_collapse_to_one() {
    init_test_logging();

    let network = MockNetwork::new();
    network.add_server(URI_A);
    let server_b = network.add_server(URI_B);
    // Keep the winning switch in flight long enough for the second
    // trigger to arrive.
    server_b.set_connect_latency(Duration::from_millis(50));

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();

    let first = controller.clone();
    let second = controller.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { first.switch_servers().await }),
        tokio::spawn(async move {
            // Fire while the first switch sits in the connect latency.
            tokio::time::sleep(Duration::from_millis(10)).await;
            second.switch_servers().await
        }),
    );
    let r1 = r1.unwrap().unwrap();
    let r2 = r2.unwrap().unwrap();

    // Exactly one performed the switch, the other was absorbed.
    assert!(r1 ^ r2);
    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_B));

    controller.stop().await;
}

#[tokio::test]
async fn test_session_loss_switches_after_grace_period() {
    init_test_logging();

    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    network.add_server(URI_B);

    let (controller, mut events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();
    assert_eq!(next_event(&mut events).await, SinkEvent::EquipmentState(EquipmentState::Ok));

    server_a.emit(SessionEvent::Deactivated).await;

    assert_eq!(
        next_event(&mut events).await,
        SinkEvent::EquipmentState(EquipmentState::ConnectionLost)
    );
    // The 20ms grace expires without reactivation; the controller moves.
    wait_for_state(&controller, ControllerState::Connected(URI_B.into())).await;
    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_B));

    controller.stop().await;
}

#[tokio::test]
async fn test_reactivation_within_grace_cancels_switch() {
    init_test_logging();

    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    let server_b = network.add_server(URI_B);

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();

    server_a.emit(SessionEvent::Deactivated).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    server_a.emit(SessionEvent::Activated).await;

    wait_for_state(&controller, ControllerState::Connected(URI_A.into())).await;
    // Well past the grace period: still on A, B never touched.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_A));
    assert_eq!(server_b.connect_count(), 0);

    controller.stop().await;
}

#[tokio::test]
async fn test_standalone_server_resolves_single_server_mode() {
    init_test_logging();

    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    let server_b = network.add_server(URI_B);
    server_a.set_redundancy(RedundancySupport::None);

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();
    assert_eq!(controller.mode(), Some(RedundancyMode::SingleServer));

    // Session loss in single-server mode is left to the session layer; no
    // grace timer, no switch.
    server_a.emit(SessionEvent::Deactivated).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_A));
    assert_eq!(server_b.connect_count(), 0);

    controller.stop().await;
}

#[tokio::test]
async fn test_switch_request_ignored_in_single_server_mode() {
    init_test_logging();

    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    let server_b = network.add_server(URI_B);
    server_a.set_redundancy(RedundancySupport::None);

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();
    assert_eq!(controller.mode(), Some(RedundancyMode::SingleServer));

    // No selection, no switch; the active session is left alone.
    assert!(!controller.switch_servers().await.unwrap());
    assert_eq!(controller.state(), ControllerState::Connected(URI_A.into()));
    assert_eq!(controller.active_uri().await.as_deref(), Some(URI_A));
    assert_eq!(server_b.connect_count(), 0);

    controller.stop().await;
}

#[tokio::test]
async fn test_degraded_service_level_notification_triggers_switch() {
    init_test_logging();

    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    network.add_server(URI_B);

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();
    assert_eq!(controller.mode(), Some(RedundancyMode::ColdFailover));

    // The controller monitors the service-level node on the active
    // server; push a degraded reading through that item.
    let diag_handle = server_a
        .created_items()
        .iter()
        .flat_map(|(_, defs)| defs.iter())
        .find(|def| def.address == service_level_node())
        .map(|def| def.client_handle)
        .expect("diagnostics item subscribed on the active server");

    server_a
        .emit(SessionEvent::DataChange(DataChange {
            client_handle: diag_handle,
            value: Value::Int32(10),
            quality: Quality::Good,
            timestamp: chrono::Utc::now(),
        }))
        .await;

    wait_for_state(&controller, ControllerState::Connected(URI_B.into())).await;

    controller.stop().await;
}

#[tokio::test]
async fn test_trust_violation_during_switch_ends_exhausted() {
    init_test_logging();

    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    let server_b = network.add_server(URI_B);

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();

    // Every candidate now presents an untrusted certificate; the switch
    // loop cannot retry past a configuration failure.
    server_a.set_trust_violation(true);
    server_b.set_trust_violation(true);

    let result = controller.switch_servers().await;
    assert!(matches!(result, Err(ClientError::Configuration(_))));
    assert_eq!(controller.state(), ControllerState::Exhausted);

    controller.stop().await;
}

#[tokio::test]
async fn test_stop_ends_exhausted_switch_loop() {
    init_test_logging();

    let network = MockNetwork::new();
    let server_a = network.add_server(URI_A);
    let server_b = network.add_server(URI_B);

    let (controller, _events) = mock_controller(fast_config(), &network);
    controller.connect(candidates()).await.unwrap();

    // Nothing left to switch to; the loop retries until stopped.
    server_a.set_reachable(false);
    server_b.set_reachable(false);

    let switching = controller.clone();
    let task = tokio::spawn(async move { switching.switch_servers().await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    controller.stop().await;

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("switch loop did not end after stop")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(controller.state(), ControllerState::Stopped);
}
