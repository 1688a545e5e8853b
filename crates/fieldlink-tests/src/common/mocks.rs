// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! A scriptable in-memory server network behind the transport seam.
//!
//! ## Design Principles
//!
//! - Configurable behavior for different test scenarios
//! - Recording of interactions for verification
//! - Thread-safe for concurrent testing
//! - Easy to set up error injection

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use fieldlink_core::error::{ClientError, ClientResult, SecurityError};
use fieldlink_core::types::{NodeAddress, Quality, Value};
use fieldlink_opcua::failover::TransportFactory;
use fieldlink_opcua::transport::{
    AccessPoint, Credentials, ItemDefinition, ItemStatus, RedundancySupport, SecurityMode,
    ServerTransport, SessionEvent, SubscriptionHandle,
};

// =============================================================================
// Mock Server
// =============================================================================

/// One connect attempt, as recorded by [`MockServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    /// Credential kind offered.
    pub strategy: String,
    /// Access-point policy targeted.
    pub policy: String,
    /// Security level of the targeted point.
    pub security_level: u8,
}

/// Scriptable state of one server in the mock network.
///
/// All knobs may be flipped mid-test; counters record everything the
/// client did.
#[derive(Debug)]
pub struct MockServer {
    /// Server is reachable at all (discovery and session connect).
    reachable: AtomicBool,

    /// Discovery works but session connects fail at transport level.
    fail_session_connect: AtomicBool,

    /// All post-connect requests fail.
    fail_requests: AtomicBool,

    /// Session connect fails with an untrusted-certificate violation.
    trust_violation: AtomicBool,

    /// Credential kinds the server rejects with an auth error.
    rejected_strategies: Mutex<HashSet<String>>,

    /// Access-point policies whose connects fail at transport level.
    failing_policies: Mutex<HashSet<String>>,

    /// Advertised access points.
    access_points: Mutex<Vec<AccessPoint>>,

    /// Advertised redundancy support.
    redundancy: Mutex<RedundancySupport>,

    /// Diagnostics: service level (ns=0;i=2267).
    service_level: AtomicU8,

    /// Diagnostics: server state (ns=0;i=2259), 0 = running.
    server_state: AtomicU32,

    /// Simulated session connect latency.
    connect_latency: Mutex<Duration>,

    /// Node values served by `read`.
    values: Mutex<HashMap<NodeAddress, (Value, Quality)>>,

    /// Parent-object lookup table for `browse_parent`.
    parents: Mutex<HashMap<NodeAddress, NodeAddress>>,

    /// Tags whose item creation is rejected.
    rejected_items: Mutex<HashSet<String>>,

    /// Live subscriptions with their publish intervals.
    subscriptions: Mutex<HashMap<u32, Duration>>,
    next_subscription: AtomicU32,

    /// Items created, per batch, in call order.
    created_items: Mutex<Vec<(SubscriptionHandle, Vec<ItemDefinition>)>>,

    /// Items deleted, in call order.
    deleted_items: Mutex<Vec<(SubscriptionHandle, u32)>>,

    /// Writes observed, in call order.
    writes: Mutex<Vec<(NodeAddress, Value)>>,

    /// Connect attempts, in order, for negotiation assertions.
    connect_log: Mutex<Vec<ConnectAttempt>>,

    /// Event sender captured at the latest successful connect.
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,

    // Interaction counters.
    connect_count: AtomicU64,
    read_count: AtomicU64,
    write_count: AtomicU64,
    create_subscription_count: AtomicU64,
    delete_subscription_count: AtomicU64,
    create_items_count: AtomicU64,
    delete_item_count: AtomicU64,
}

impl MockServer {
    /// Creates a healthy, reachable server with one open access point and
    /// a full service level.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(true),
            fail_session_connect: AtomicBool::new(false),
            fail_requests: AtomicBool::new(false),
            trust_violation: AtomicBool::new(false),
            rejected_strategies: Mutex::new(HashSet::new()),
            failing_policies: Mutex::new(HashSet::new()),
            access_points: Mutex::new(vec![AccessPoint::new("None", SecurityMode::None, 0)]),
            redundancy: Mutex::new(RedundancySupport::Cold),
            service_level: AtomicU8::new(255),
            server_state: AtomicU32::new(0),
            connect_latency: Mutex::new(Duration::ZERO),
            values: Mutex::new(HashMap::new()),
            parents: Mutex::new(HashMap::new()),
            rejected_items: Mutex::new(HashSet::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription: AtomicU32::new(1),
            created_items: Mutex::new(Vec::new()),
            deleted_items: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            connect_log: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            connect_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            create_subscription_count: AtomicU64::new(0),
            delete_subscription_count: AtomicU64::new(0),
            create_items_count: AtomicU64::new(0),
            delete_item_count: AtomicU64::new(0),
        })
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    /// Makes the server (un)reachable.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Keeps discovery working but fails session connects.
    pub fn set_fail_session_connect(&self, fail: bool) {
        self.fail_session_connect.store(fail, Ordering::SeqCst);
    }

    /// Fails every post-connect request.
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Makes session connects fail with a trust violation.
    pub fn set_trust_violation(&self, violate: bool) {
        self.trust_violation.store(violate, Ordering::SeqCst);
    }

    /// Rejects a credential kind with an authentication error.
    pub fn reject_strategy(&self, strategy: &str) {
        self.rejected_strategies.lock().insert(strategy.to_string());
    }

    /// Fails session connects on one access-point policy at transport
    /// level.
    pub fn fail_policy(&self, policy: &str) {
        self.failing_policies.lock().insert(policy.to_string());
    }

    /// Replaces the advertised access points.
    pub fn set_access_points(&self, points: Vec<AccessPoint>) {
        *self.access_points.lock() = points;
    }

    /// Sets the advertised redundancy support.
    pub fn set_redundancy(&self, support: RedundancySupport) {
        *self.redundancy.lock() = support;
    }

    /// Sets the diagnostic service level.
    pub fn set_service_level(&self, level: u8) {
        self.service_level.store(level, Ordering::SeqCst);
    }

    /// Sets the diagnostic server state (0 = running).
    pub fn set_server_state(&self, state: u32) {
        self.server_state.store(state, Ordering::SeqCst);
    }

    /// Sets the session connect latency.
    pub fn set_connect_latency(&self, latency: Duration) {
        *self.connect_latency.lock() = latency;
    }

    /// Serves a value for a node.
    pub fn set_value(&self, address: NodeAddress, value: Value, quality: Quality) {
        self.values.lock().insert(address, (value, quality));
    }

    /// Registers a parent object for a method node.
    pub fn set_parent(&self, node: NodeAddress, parent: NodeAddress) {
        self.parents.lock().insert(node, parent);
    }

    /// Rejects item creation for a tag.
    pub fn reject_item(&self, tag: &str) {
        self.rejected_items.lock().insert(tag.to_string());
    }

    /// Forgets a subscription server-side, as a session transfer would.
    pub fn drop_subscription(&self, handle: SubscriptionHandle) {
        self.subscriptions.lock().remove(&handle.0);
    }

    /// Pushes a session event to the client, if a session is registered.
    pub async fn emit(&self, event: SessionEvent) {
        let sender = self.events.lock().clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Connect attempts in order.
    pub fn connect_log(&self) -> Vec<ConnectAttempt> {
        self.connect_log.lock().clone()
    }

    /// Number of session connect attempts.
    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Number of reads served.
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Number of writes served.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Number of subscriptions created.
    pub fn create_subscription_count(&self) -> u64 {
        self.create_subscription_count.load(Ordering::SeqCst)
    }

    /// Number of subscriptions deleted.
    pub fn delete_subscription_count(&self) -> u64 {
        self.delete_subscription_count.load(Ordering::SeqCst)
    }

    /// Number of item batches created.
    pub fn create_items_count(&self) -> u64 {
        self.create_items_count.load(Ordering::SeqCst)
    }

    /// Number of items deleted.
    pub fn delete_item_count(&self) -> u64 {
        self.delete_item_count.load(Ordering::SeqCst)
    }

    /// Total protocol interactions, for "no network call" assertions.
    pub fn total_calls(&self) -> u64 {
        self.connect_count()
            + self.read_count()
            + self.write_count()
            + self.create_subscription_count()
            + self.delete_subscription_count()
            + self.create_items_count()
            + self.delete_item_count()
    }

    /// Item batches created, in call order.
    pub fn created_items(&self) -> Vec<(SubscriptionHandle, Vec<ItemDefinition>)> {
        self.created_items.lock().clone()
    }

    /// Items deleted, in call order.
    pub fn deleted_items(&self) -> Vec<(SubscriptionHandle, u32)> {
        self.deleted_items.lock().clone()
    }

    /// Writes observed, in call order.
    pub fn writes(&self) -> Vec<(NodeAddress, Value)> {
        self.writes.lock().clone()
    }

    /// Publish intervals of live subscriptions, keyed by handle.
    pub fn live_subscriptions(&self) -> HashMap<u32, Duration> {
        self.subscriptions.lock().clone()
    }

    fn check_requests(&self, operation: &str) -> ClientResult<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(ClientError::request_failed(operation, "mock request failure"));
        }
        Ok(())
    }
}

// =============================================================================
// Mock Transport
// =============================================================================

/// Transport view of one [`MockServer`], as handed out by the factory.
#[derive(Debug, Clone)]
pub struct MockTransport {
    server: Arc<MockServer>,
}

impl MockTransport {
    /// Creates a transport over a server.
    pub fn new(server: Arc<MockServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl ServerTransport for MockTransport {
    async fn discover_access_points(&self, uri: &str) -> ClientResult<Vec<AccessPoint>> {
        if !self.server.reachable.load(Ordering::SeqCst) {
            return Err(ClientError::connect_failed(uri, "mock server unreachable"));
        }
        Ok(self.server.access_points.lock().clone())
    }

    async fn connect(
        &self,
        uri: &str,
        point: &AccessPoint,
        credentials: &Credentials,
        events: mpsc::Sender<SessionEvent>,
    ) -> ClientResult<()> {
        self.server.connect_count.fetch_add(1, Ordering::SeqCst);
        self.server.connect_log.lock().push(ConnectAttempt {
            strategy: credentials.kind().to_string(),
            policy: point.policy.clone(),
            security_level: point.security_level,
        });

        let latency = *self.server.connect_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.server.trust_violation.load(Ordering::SeqCst) {
            return Err(SecurityError::untrusted_certificate("aa:bb:cc:dd").into());
        }
        if self
            .server
            .rejected_strategies
            .lock()
            .contains(credentials.kind())
        {
            return Err(SecurityError::authentication_rejected(
                credentials.kind(),
                "mock identity rejection",
            )
            .into());
        }
        if !self.server.reachable.load(Ordering::SeqCst)
            || self.server.fail_session_connect.load(Ordering::SeqCst)
            || self.server.failing_policies.lock().contains(&point.policy)
        {
            return Err(ClientError::connect_failed(uri, "mock connect failure"));
        }

        *self.server.events.lock() = Some(events);
        Ok(())
    }

    async fn close(&self) -> ClientResult<()> {
        *self.server.events.lock() = None;
        Ok(())
    }

    async fn read(&self, address: &NodeAddress) -> ClientResult<(Value, Quality)> {
        self.server.read_count.fetch_add(1, Ordering::SeqCst);
        self.server.check_requests("read")?;

        if *address == NodeAddress::numeric(0, 2267) {
            let level = self.server.service_level.load(Ordering::SeqCst);
            return Ok((Value::Int32(i32::from(level)), Quality::Good));
        }
        if *address == NodeAddress::numeric(0, 2259) {
            let state = self.server.server_state.load(Ordering::SeqCst);
            return Ok((Value::Int32(state as i32), Quality::Good));
        }

        self.server
            .values
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| ClientError::request_failed("read", format!("no such node {address}")))
    }

    async fn write(&self, address: &NodeAddress, value: Value) -> ClientResult<bool> {
        self.server.write_count.fetch_add(1, Ordering::SeqCst);
        self.server.check_requests("write")?;
        self.server.writes.lock().push((address.clone(), value));
        Ok(true)
    }

    async fn call_method(
        &self,
        _object: &NodeAddress,
        _method: &NodeAddress,
        args: Vec<Value>,
    ) -> ClientResult<(bool, Vec<Value>)> {
        self.server.check_requests("call")?;
        // Echo the inputs back; enough to assert plumbing.
        Ok((true, args))
    }

    async fn browse_parent(&self, node: &NodeAddress) -> ClientResult<Option<NodeAddress>> {
        self.server.check_requests("browse")?;
        Ok(self.server.parents.lock().get(node).cloned())
    }

    async fn create_subscription(
        &self,
        publish_interval: Duration,
    ) -> ClientResult<SubscriptionHandle> {
        self.server
            .create_subscription_count
            .fetch_add(1, Ordering::SeqCst);
        self.server.check_requests("create_subscription")?;

        let id = self.server.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.server.subscriptions.lock().insert(id, publish_interval);
        Ok(SubscriptionHandle(id))
    }

    async fn delete_subscription(&self, handle: SubscriptionHandle) -> ClientResult<()> {
        self.server
            .delete_subscription_count
            .fetch_add(1, Ordering::SeqCst);
        self.server.check_requests("delete_subscription")?;
        self.server.subscriptions.lock().remove(&handle.0);
        Ok(())
    }

    async fn create_items(
        &self,
        handle: SubscriptionHandle,
        definitions: &[ItemDefinition],
    ) -> ClientResult<Vec<ItemStatus>> {
        self.server.create_items_count.fetch_add(1, Ordering::SeqCst);
        self.server.check_requests("create_items")?;

        let rejected = self.server.rejected_items.lock();
        let statuses = definitions
            .iter()
            .map(|def| {
                if rejected.contains(def.tag.as_str()) {
                    ItemStatus::bad(def.client_handle, 0x8000_0000)
                } else {
                    ItemStatus::good(def.client_handle)
                }
            })
            .collect();
        drop(rejected);

        self.server
            .created_items
            .lock()
            .push((handle, definitions.to_vec()));
        Ok(statuses)
    }

    async fn delete_item(
        &self,
        handle: SubscriptionHandle,
        client_handle: u32,
    ) -> ClientResult<()> {
        self.server.delete_item_count.fetch_add(1, Ordering::SeqCst);
        self.server.check_requests("delete_item")?;
        self.server.deleted_items.lock().push((handle, client_handle));
        Ok(())
    }

    async fn subscription_current(&self, handle: SubscriptionHandle) -> ClientResult<bool> {
        self.server.check_requests("subscription_current")?;
        Ok(self.server.subscriptions.lock().contains_key(&handle.0))
    }

    async fn redundancy_support(&self) -> ClientResult<RedundancySupport> {
        self.server.check_requests("redundancy_support")?;
        Ok(*self.server.redundancy.lock())
    }
}

// =============================================================================
// Mock Network & Factory
// =============================================================================

/// A set of named mock servers acting as one redundant network.
#[derive(Debug, Default)]
pub struct MockNetwork {
    servers: Mutex<HashMap<String, Arc<MockServer>>>,
}

impl MockNetwork {
    /// Creates an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a fresh healthy server under `uri` and returns it for
    /// scripting.
    pub fn add_server(&self, uri: &str) -> Arc<MockServer> {
        let server = MockServer::new();
        self.servers.lock().insert(uri.to_string(), server.clone());
        server
    }

    /// Looks up a server.
    pub fn server(&self, uri: &str) -> Option<Arc<MockServer>> {
        self.servers.lock().get(uri).cloned()
    }
}

/// Factory producing [`MockTransport`]s from a shared [`MockNetwork`].
///
/// Unknown URIs get an unreachable server, so typos fail loudly instead
/// of vacuously succeeding.
#[derive(Debug, Clone)]
pub struct MockTransportFactory {
    network: Arc<MockNetwork>,
}

impl MockTransportFactory {
    /// Creates a factory over a network.
    pub fn new(network: Arc<MockNetwork>) -> Self {
        Self { network }
    }
}

impl TransportFactory for MockTransportFactory {
    type Transport = MockTransport;

    fn create(&self, uri: &str) -> MockTransport {
        let server = self.network.server(uri).unwrap_or_else(|| {
            let server = MockServer::new();
            server.set_reachable(false);
            server
        });
        MockTransport::new(server)
    }
}
