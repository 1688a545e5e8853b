// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Redundant-server failover.
//!
//! The controller owns the set of candidate servers, the currently active
//! endpoint, and every background task: the session event loop, the
//! inactive-session timer and the unbounded switch-retry loop. Two
//! variants exist behind one factory:
//!
//! - **Single-server**: connect once, let the session layer reconnect.
//! - **Cold-failover**: health-based server selection, diagnostics
//!   monitoring and explicit server switching.
//!
//! A switch runs single-flight: whichever trigger wins the guard performs
//! the switch, every concurrent trigger is absorbed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fieldlink_core::config::{ClientConfig, RedundancyOverride};
use fieldlink_core::error::{ClientError, ClientResult, CommunicationError, ConfigurationError};
use fieldlink_core::retry::{LinkState, OperationKind, RetryExecutor};
use fieldlink_core::shutdown::StopToken;
use fieldlink_core::sink::EventSink;
use fieldlink_core::types::{Deadband, EquipmentState, NodeAddress, Quality, TagId, Value};

use crate::endpoint::Endpoint;
use crate::registry::{TagConfig, TagSubscriptionRegistry};
use crate::security::{CertifierSettings, SecurityNegotiator};
use crate::transport::{
    DataChange, ItemDefinition, RedundancySupport, ServerTransport, SessionEvent,
};

// =============================================================================
// Diagnostics Addresses
// =============================================================================

/// Namespace-0 node carrying the server's service level (0-255).
pub fn service_level_node() -> NodeAddress {
    NodeAddress::numeric(0, 2267)
}

/// Namespace-0 node carrying the server's run state (0 = running).
pub fn server_state_node() -> NodeAddress {
    NodeAddress::numeric(0, 2259)
}

// Client handles reserved for the controller's own diagnostic items, far
// above anything the registry allocates.
const DIAG_SERVICE_LEVEL_HANDLE: u32 = u32::MAX - 1;
const DIAG_SERVER_STATE_HANDLE: u32 = u32::MAX - 2;

const DIAG_PUBLISH_INTERVAL: Duration = Duration::from_millis(1000);
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// TransportFactory
// =============================================================================

/// Creates one transport per candidate server.
pub trait TransportFactory: Send + Sync + 'static {
    /// The transport type produced.
    type Transport: ServerTransport + 'static;

    /// Creates an unconnected transport targeting `uri`.
    fn create(&self, uri: &str) -> Self::Transport;
}

// =============================================================================
// RedundancyMode
// =============================================================================

/// Which controller variant is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedundancyMode {
    /// One server, no switching.
    SingleServer,
    /// Explicit switching across a cold-redundant set.
    ColdFailover,
}

impl RedundancyMode {
    /// Resolves the mode from the config override, falling back to the
    /// server-advertised support.
    pub fn resolve(override_: RedundancyOverride, advertised: RedundancySupport) -> Self {
        match override_ {
            RedundancyOverride::SingleServer => Self::SingleServer,
            RedundancyOverride::ColdFailover => Self::ColdFailover,
            RedundancyOverride::Auto => match advertised {
                RedundancySupport::None | RedundancySupport::Transparent => Self::SingleServer,
                RedundancySupport::Cold | RedundancySupport::Warm | RedundancySupport::Hot => {
                    Self::ColdFailover
                }
            },
        }
    }
}

// =============================================================================
// ControllerState
// =============================================================================

/// Observable lifecycle state of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    /// Not started, or stopped.
    Stopped,
    /// First connection in progress.
    Connecting,
    /// Connected to the given server.
    Connected(String),
    /// Session inactive; waiting out the reconnect grace period.
    AwaitingReconnect,
    /// Server switch in progress.
    Switching,
    /// Connect or switch failed terminally; nothing active.
    Exhausted,
}

// =============================================================================
// FailoverController
// =============================================================================

/// Redundant-server state machine and client facade.
pub struct FailoverController<F: TransportFactory> {
    // Handle to ourselves for the tasks we spawn.
    weak: Weak<Self>,

    config: ClientConfig,
    factory: F,
    negotiator: SecurityNegotiator,
    registry: TagSubscriptionRegistry,
    sink: Arc<dyn EventSink>,

    stop: StopToken,
    link: LinkState,
    loop_executor: RetryExecutor,

    state: parking_lot::Mutex<ControllerState>,
    mode: parking_lot::Mutex<Option<RedundancyMode>>,
    candidates: parking_lot::Mutex<Vec<String>>,
    active: RwLock<Option<Arc<Endpoint<F::Transport>>>>,

    // Single-flight switch guard.
    switching: AtomicBool,

    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
    event_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    reconnect_timer: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<F: TransportFactory> FailoverController<F> {
    /// Creates a controller. The configuration is validated here.
    pub fn new(
        config: ClientConfig,
        factory: F,
        settings: CertifierSettings,
        sink: Arc<dyn EventSink>,
    ) -> ClientResult<Arc<Self>> {
        config.validate()?;
        let negotiator = SecurityNegotiator::from_table(&config.certifiers, &settings)?;
        let registry = TagSubscriptionRegistry::new(config.clone(), sink.clone());

        let stop = StopToken::new();
        let link = LinkState::new();
        let loop_executor = RetryExecutor::new(config.retry_policy(), link.clone(), stop.clone());
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            config,
            factory,
            negotiator,
            registry,
            sink,
            stop,
            link,
            loop_executor,
            state: parking_lot::Mutex::new(ControllerState::Stopped),
            mode: parking_lot::Mutex::new(None),
            candidates: parking_lot::Mutex::new(Vec::new()),
            active: RwLock::new(None),
            switching: AtomicBool::new(false),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            event_task: parking_lot::Mutex::new(None),
            reconnect_timer: parking_lot::Mutex::new(None),
        }))
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ControllerState {
        self.state.lock().clone()
    }

    /// The resolved redundancy mode, once connected.
    pub fn mode(&self) -> Option<RedundancyMode> {
        *self.mode.lock()
    }

    /// URI of the active server, if any.
    pub async fn active_uri(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|e| e.uri().to_string())
    }

    /// Last-known session activity of the active endpoint.
    pub async fn is_connected(&self) -> bool {
        self.active
            .read()
            .await
            .as_ref()
            .map(|e| e.is_connected())
            .unwrap_or(false)
    }

    fn set_state(&self, next: ControllerState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = ?*state, to = ?next, "controller state transition");
            *state = next;
        }
    }

    async fn active_endpoint(&self) -> ClientResult<Arc<Endpoint<F::Transport>>> {
        self.active
            .read()
            .await
            .clone()
            .ok_or_else(|| CommunicationError::session_closed("no active server").into())
    }

    fn make_endpoint(&self, uri: &str) -> Arc<Endpoint<F::Transport>> {
        let executor =
            RetryExecutor::new(self.config.retry_policy(), self.link.clone(), self.stop.clone());
        Arc::new(Endpoint::new(uri, self.factory.create(uri), executor))
    }

    // =========================================================================
    // Connect & Stop
    // =========================================================================

    /// Connects to the redundant set.
    ///
    /// `candidates` may be empty, in which case the configured static URI
    /// list is used. Initial failure is reported outward as
    /// `ConnectionFailed` before the error is returned.
    pub async fn connect(&self, candidates: Vec<String>) -> ClientResult<()> {
        let candidates = if candidates.is_empty() {
            self.config.server_uris.clone()
        } else {
            candidates
        };
        if candidates.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "server_uris",
                "no candidate servers given",
            )
            .into());
        }

        self.set_state(ControllerState::Connecting);
        *self.candidates.lock() = candidates.clone();

        let selected = match self.select_server(&candidates, None).await {
            Ok(endpoint) => endpoint,
            Err(error) => {
                self.set_state(ControllerState::Exhausted);
                self.sink
                    .on_equipment_state(EquipmentState::ConnectionFailed)
                    .await;
                return Err(error);
            }
        };

        // Resolve the mode from the winner's advertised support.
        let advertised = selected
            .redundancy_support()
            .await
            .unwrap_or(RedundancySupport::None);
        let mode = RedundancyMode::resolve(self.config.redundancy, advertised);
        *self.mode.lock() = Some(mode);
        info!(uri = selected.uri(), ?mode, "connected to server");

        if mode == RedundancyMode::ColdFailover {
            self.monitor_diagnostics(&selected).await;
        }

        let uri = selected.uri().to_string();
        *self.active.write().await = Some(selected);
        self.set_state(ControllerState::Connected(uri));
        self.sink.on_equipment_state(EquipmentState::Ok).await;

        self.spawn_event_loop().await;
        Ok(())
    }

    /// Stops the controller. Idempotent; cancels the timer, ends the
    /// event loop and closes the active session.
    pub async fn stop(&self) {
        self.stop.stop();
        self.cancel_reconnect_timer();

        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }

        if let Some(endpoint) = self.active.write().await.take() {
            endpoint.disconnect().await;
        }

        self.set_state(ControllerState::Stopped);
        info!("controller stopped");
    }

    // =========================================================================
    // Server Selection
    // =========================================================================

    /// Picks the healthiest reachable candidate.
    ///
    /// The previous active server is tried last. The first candidate at or
    /// above the healthy service level wins immediately; otherwise the
    /// highest level seen wins; no reachable candidate is a
    /// `NoRedundantServer` error.
    async fn select_server(
        &self,
        candidates: &[String],
        previous: Option<&str>,
    ) -> ClientResult<Arc<Endpoint<F::Transport>>> {
        let mut ordered: Vec<&String> = candidates
            .iter()
            .filter(|uri| Some(uri.as_str()) != previous)
            .collect();
        if let Some(prev) = previous {
            if let Some(found) = candidates.iter().find(|uri| uri.as_str() == prev) {
                ordered.push(found);
            }
        }

        let mut best: Option<(u8, Arc<Endpoint<F::Transport>>)> = None;

        for uri in ordered {
            if self.stop.is_stopped() {
                if let Some((_, endpoint)) = best.take() {
                    endpoint.disconnect().await;
                }
                return Err(ClientError::Stopped);
            }

            let endpoint = self.make_endpoint(uri);
            if let Err(error) = endpoint
                .initialize(&self.negotiator, self.events_tx.clone())
                .await
            {
                if error.is_configuration() {
                    // A trust or config problem will not differ per server
                    // attempt order; surface it.
                    if let Some((_, old)) = best.take() {
                        old.disconnect().await;
                    }
                    return Err(error);
                }
                debug!(uri, error = %error, "candidate unreachable");
                continue;
            }

            let level = self.read_service_level(&endpoint).await;
            debug!(uri, level, "candidate service level");

            if level >= self.config.healthy_service_level {
                if let Some((_, old)) = best.take() {
                    old.disconnect().await;
                }
                info!(uri, level, "healthy candidate selected");
                return Ok(endpoint);
            }

            match &best {
                Some((best_level, _)) if *best_level >= level => {
                    endpoint.disconnect().await;
                }
                _ => {
                    if let Some((_, old)) = best.replace((level, endpoint)) {
                        old.disconnect().await;
                    }
                }
            }
        }

        match best {
            Some((level, endpoint)) => {
                warn!(
                    uri = endpoint.uri(),
                    level, "no healthy candidate, using the best available"
                );
                Ok(endpoint)
            }
            None => Err(CommunicationError::NoRedundantServer.into()),
        }
    }

    /// Reads the service level, treating failures as level 0.
    async fn read_service_level(&self, endpoint: &Endpoint<F::Transport>) -> u8 {
        match endpoint.read(&service_level_node()).await {
            Ok((value, quality)) if quality.is_good() => {
                value.as_i64().map(|v| v.clamp(0, 255) as u8).unwrap_or(0)
            }
            Ok(_) => 0,
            Err(error) => {
                debug!(uri = endpoint.uri(), error = %error, "service level read failed");
                0
            }
        }
    }

    // =========================================================================
    // Switching
    // =========================================================================

    /// Switches to another server in the set.
    ///
    /// Single-flight: returns `Ok(false)` when a switch is already running
    /// and this trigger was absorbed. Retries without bound (exponential
    /// backoff) until a server is selected or the controller stops. In
    /// single-server mode there is nothing to switch to; the request is
    /// ignored and `Ok(false)` returned.
    pub async fn switch_servers(&self) -> ClientResult<bool> {
        if self.mode() == Some(RedundancyMode::SingleServer) {
            debug!("single-server mode, switch request ignored");
            return Ok(false);
        }
        if self
            .switching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("switch already in flight, trigger absorbed");
            return Ok(false);
        }

        let result = self.run_switch().await;
        self.switching.store(false, Ordering::SeqCst);
        result.map(|_| true)
    }

    async fn run_switch(&self) -> ClientResult<()> {
        let Some(controller) = self.weak.upgrade() else {
            return Ok(());
        };
        self.set_state(ControllerState::Switching);
        self.cancel_reconnect_timer();

        let previous = {
            let taken = self.active.write().await.take();
            match taken {
                Some(endpoint) => {
                    let uri = endpoint.uri().to_string();
                    endpoint.disconnect().await;
                    Some(uri)
                }
                None => None,
            }
        };
        self.link.mark_disconnected();

        let candidates = self.candidates.lock().clone();
        let backoff = self.config.failover_backoff();

        let outcome = match self
            .loop_executor
            .run_until_stopped(OperationKind::Connect, &backoff, move || {
                let controller = controller.clone();
                let candidates = candidates.clone();
                let previous = previous.clone();
                async move {
                    let endpoint = controller
                        .select_server(&candidates, previous.as_deref())
                        .await?;
                    controller.registry.resubscribe_all(&endpoint).await?;
                    controller.monitor_diagnostics(&endpoint).await;
                    Ok(endpoint)
                }
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(ClientError::Stopped) => None,
            Err(error) => {
                // Non-retryable failure with nothing active anymore.
                self.set_state(ControllerState::Exhausted);
                return Err(error);
            }
        };

        match outcome {
            Some(endpoint) => {
                let uri = endpoint.uri().to_string();
                *self.active.write().await = Some(endpoint);
                self.link.mark_connected();
                self.set_state(ControllerState::Connected(uri.clone()));
                self.sink.on_equipment_state(EquipmentState::Ok).await;
                info!(uri, "server switch complete");
                Ok(())
            }
            None => {
                // Stopped mid-switch.
                self.set_state(ControllerState::Stopped);
                Ok(())
            }
        }
    }

    /// Subscribes the controller's diagnostic items on `endpoint`. Best
    /// effort; a server without the diagnostics nodes still works, it just
    /// cannot trigger health-based switches.
    async fn monitor_diagnostics(&self, endpoint: &Endpoint<F::Transport>) {
        let result = async {
            let handle = endpoint.create_subscription(DIAG_PUBLISH_INTERVAL).await?;
            let definitions = vec![
                ItemDefinition {
                    tag: TagId::new("__diag.service_level"),
                    client_handle: DIAG_SERVICE_LEVEL_HANDLE,
                    address: service_level_node(),
                    sampling_interval: DIAG_PUBLISH_INTERVAL,
                    deadband: Deadband::none(),
                },
                ItemDefinition {
                    tag: TagId::new("__diag.server_state"),
                    client_handle: DIAG_SERVER_STATE_HANDLE,
                    address: server_state_node(),
                    sampling_interval: DIAG_PUBLISH_INTERVAL,
                    deadband: Deadband::none(),
                },
            ];
            endpoint.subscribe_items(handle, definitions).await
        }
        .await;

        if let Err(error) = result {
            warn!(uri = endpoint.uri(), error = %error, "diagnostics monitoring unavailable");
        }
    }

    // =========================================================================
    // Event Loop & Timer
    // =========================================================================

    async fn spawn_event_loop(&self) {
        let Some(mut rx) = self.events_rx.lock().await.take() else {
            return; // already running
        };
        let Some(controller) = self.weak.upgrade() else {
            return;
        };
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = controller.stop.stopped() => break,
                    event = rx.recv() => match event {
                        Some(event) => controller.handle_event(event).await,
                        None => break,
                    },
                }
            }
            debug!("event loop ended");
        });
        *self.event_task.lock() = Some(task);
    }

    async fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Activated => {
                self.cancel_reconnect_timer();
                if let Some(endpoint) = self.active.read().await.as_ref() {
                    endpoint.set_session_active(true);
                    self.set_state(ControllerState::Connected(endpoint.uri().to_string()));
                }
                self.sink.on_equipment_state(EquipmentState::Ok).await;
            }
            SessionEvent::Deactivated => {
                if let Some(endpoint) = self.active.read().await.as_ref() {
                    endpoint.set_session_active(false);
                }
                self.sink
                    .on_equipment_state(EquipmentState::ConnectionLost)
                    .await;
                if self.mode() == Some(RedundancyMode::ColdFailover) {
                    self.set_state(ControllerState::AwaitingReconnect);
                    self.start_reconnect_timer();
                }
            }
            SessionEvent::DataChange(change) => match change.client_handle {
                DIAG_SERVICE_LEVEL_HANDLE => self.handle_service_level(&change).await,
                DIAG_SERVER_STATE_HANDLE => self.handle_server_state(&change).await,
                _ => self.registry.dispatch_update(change).await,
            },
            SessionEvent::TransferFailed(handle) => {
                let endpoint = { self.active.read().await.clone() };
                if let Some(endpoint) = endpoint {
                    if let Err(err) = self.registry.recreate_subscription(&endpoint, handle).await
                    {
                        error!(%handle, error = %err, "subscription recreation failed");
                    }
                }
            }
        }
    }

    async fn handle_service_level(&self, change: &DataChange) {
        let level = change.value.as_i64().map(|v| v.clamp(0, 255) as u8).unwrap_or(0);
        if change.quality.is_good() && level >= self.config.healthy_service_level {
            return;
        }
        warn!(level, "active server degraded, triggering switch");
        self.trigger_switch();
    }

    async fn handle_server_state(&self, change: &DataChange) {
        // State 0 is "running"; anything else means the server is leaving.
        let state = change.value.as_i64().unwrap_or(0);
        if change.quality.is_good() && state == 0 {
            return;
        }
        warn!(state, "active server no longer running, triggering switch");
        self.trigger_switch();
    }

    fn trigger_switch(&self) {
        if self.mode() != Some(RedundancyMode::ColdFailover) {
            return;
        }
        let Some(controller) = self.weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(error) = controller.switch_servers().await {
                error!(error = %error, "server switch failed");
            }
        });
    }

    fn start_reconnect_timer(&self) {
        let mut timer = self.reconnect_timer.lock();
        if timer.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return; // already ticking
        }

        let grace = self.config.reconnect_grace;
        let weak = self.weak.clone();
        let stop = self.stop.clone();
        *timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = stop.stopped() => {}
                _ = tokio::time::sleep(grace) => {
                    if let Some(controller) = weak.upgrade() {
                        warn!("session did not reactivate in time, switching servers");
                        controller.trigger_switch();
                    }
                }
            }
        }));
    }

    fn cancel_reconnect_timer(&self) {
        if let Some(timer) = self.reconnect_timer.lock().take() {
            timer.abort();
        }
    }

    // =========================================================================
    // Facade
    // =========================================================================

    /// Subscribes tags on the active server.
    pub async fn subscribe_tags(&self, tags: Vec<TagConfig>) -> ClientResult<()> {
        let endpoint = self.active_endpoint().await?;
        self.registry.subscribe_tags(&endpoint, tags).await
    }

    /// Removes one tag. Returns `false` when it was never subscribed.
    pub async fn remove_tag(&self, tag: &TagId) -> ClientResult<bool> {
        let endpoint = self.active_endpoint().await?;
        self.registry.remove_tag(&endpoint, tag).await
    }

    /// Reads every given tag once, reporting through the sink.
    pub async fn refresh(&self, tags: &[TagId]) -> ClientResult<()> {
        let endpoint = self.active_endpoint().await?;
        self.registry.refresh(&endpoint, tags).await
    }

    /// Reads a node directly.
    pub async fn read(&self, address: &NodeAddress) -> ClientResult<(Value, Quality)> {
        self.active_endpoint().await?.read(address).await
    }

    /// Writes a node directly.
    pub async fn write(&self, address: &NodeAddress, value: Value) -> ClientResult<bool> {
        self.active_endpoint().await?.write(address, value).await
    }

    /// Writes a value, waits `pulse`, then writes the variant's zero value.
    ///
    /// Used for momentary command bits that the device expects the client
    /// to clear. The reset is best effort; its failure is logged, not
    /// returned.
    pub async fn write_with_pulse_reset(
        &self,
        address: &NodeAddress,
        value: Value,
        pulse: Duration,
    ) -> ClientResult<bool> {
        let endpoint = self.active_endpoint().await?;
        let reset = pulse_reset_value(&value);
        let accepted = endpoint.write(address, value).await?;

        tokio::select! {
            _ = self.stop.stopped() => return Ok(accepted),
            _ = tokio::time::sleep(pulse) => {}
        }

        if let Err(error) = endpoint.write(address, reset).await {
            warn!(address = %address, error = %error, "pulse reset write failed");
        }
        Ok(accepted)
    }

    /// Calls a method node, resolving its parent object first.
    ///
    /// A method without a parent object is unusable and reported as a
    /// configuration error.
    pub async fn call_method(
        &self,
        method: &NodeAddress,
        args: Vec<Value>,
    ) -> ClientResult<(bool, Vec<Value>)> {
        let endpoint = self.active_endpoint().await?;
        let object = endpoint.browse_parent_object(method).await?;
        endpoint.call_method(&object, method, args).await
    }
}

/// The "cleared" value of a pulse write, matching the written variant.
fn pulse_reset_value(value: &Value) -> Value {
    match value {
        Value::Boolean(_) => Value::Boolean(false),
        Value::Int32(_) => Value::Int32(0),
        Value::Int64(_) => Value::Int64(0),
        Value::UInt32(_) => Value::UInt32(0),
        Value::Float(_) => Value::Float(0.0),
        Value::Double(_) => Value::Double(0.0),
        _ => Value::Null,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_resolution() {
        use RedundancyOverride::*;
        use RedundancySupport as S;

        assert_eq!(
            RedundancyMode::resolve(SingleServer, S::Cold),
            RedundancyMode::SingleServer
        );
        assert_eq!(
            RedundancyMode::resolve(ColdFailover, S::None),
            RedundancyMode::ColdFailover
        );
        assert_eq!(
            RedundancyMode::resolve(Auto, S::None),
            RedundancyMode::SingleServer
        );
        assert_eq!(
            RedundancyMode::resolve(Auto, S::Transparent),
            RedundancyMode::SingleServer
        );
        assert_eq!(
            RedundancyMode::resolve(Auto, S::Cold),
            RedundancyMode::ColdFailover
        );
        assert_eq!(
            RedundancyMode::resolve(Auto, S::Hot),
            RedundancyMode::ColdFailover
        );
    }

    #[test]
    fn test_pulse_reset_values() {
        assert_eq!(pulse_reset_value(&Value::Boolean(true)), Value::Boolean(false));
        assert_eq!(pulse_reset_value(&Value::Int32(7)), Value::Int32(0));
        assert_eq!(pulse_reset_value(&Value::Double(3.5)), Value::Double(0.0));
        assert_eq!(pulse_reset_value(&Value::String("x".into())), Value::Null);
    }

    #[test]
    fn test_diagnostic_addresses() {
        assert_eq!(service_level_node().to_string(), "ns=0;i=2267");
        assert_eq!(server_state_node().to_string(), "ns=0;i=2259");
    }
}
