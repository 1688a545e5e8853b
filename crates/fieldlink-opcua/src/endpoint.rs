// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! One connection to one server.
//!
//! An [`Endpoint`] wraps a [`ServerTransport`] with the retry executor and
//! owns the session bookkeeping for that server: the last-known session
//! activity flag and the set of live subscription handles. Bookkeeping is
//! updated only on success, so a failed call never leaves phantom state.
//!
//! All transport calls are serialized through the endpoint's single mutex;
//! the protocol SDKs this seam fronts do not tolerate concurrent traffic
//! on one session.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use fieldlink_core::error::{ClientError, ClientResult, ConfigurationError};
use fieldlink_core::retry::{OperationKind, RetryExecutor};
use fieldlink_core::types::{NodeAddress, Quality, Value};

use crate::security::{NegotiatedSession, SecurityNegotiator};
use crate::transport::{
    ItemDefinition, ItemStatus, RedundancySupport, ServerTransport, SessionEvent,
    SubscriptionHandle,
};

// =============================================================================
// Endpoint
// =============================================================================

/// A retry-wrapped session with one server.
pub struct Endpoint<T> {
    uri: String,
    transport: Arc<Mutex<T>>,
    executor: RetryExecutor,
    session_active: Arc<AtomicBool>,
    subscriptions: parking_lot::Mutex<HashSet<SubscriptionHandle>>,
}

impl<T: ServerTransport + 'static> Endpoint<T> {
    /// Creates an endpoint for `uri` over the given transport.
    pub fn new(uri: impl Into<String>, transport: T, executor: RetryExecutor) -> Self {
        Self {
            uri: uri.into(),
            transport: Arc::new(Mutex::new(transport)),
            executor,
            session_active: Arc::new(AtomicBool::new(false)),
            subscriptions: parking_lot::Mutex::new(HashSet::new()),
        }
    }

    /// The server URI this endpoint targets.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Last-known session activity. Never touches the network.
    pub fn is_connected(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }

    /// Records a session activity transition reported by the transport's
    /// event stream.
    pub fn set_session_active(&self, active: bool) {
        self.session_active.store(active, Ordering::SeqCst);
        if active {
            self.executor.link().mark_connected();
        } else {
            self.executor.link().mark_disconnected();
        }
    }

    /// Subscription handles currently believed live on this endpoint.
    pub fn subscription_handles(&self) -> Vec<SubscriptionHandle> {
        self.subscriptions.lock().iter().copied().collect()
    }

    fn required<V>(outcome: Option<V>) -> ClientResult<V> {
        outcome.ok_or(ClientError::Stopped)
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    /// Connects and negotiates security, registering `events` as the
    /// session observer.
    pub async fn initialize(
        &self,
        negotiator: &SecurityNegotiator,
        events: mpsc::Sender<SessionEvent>,
    ) -> ClientResult<NegotiatedSession> {
        let transport = self.transport.clone();
        let uri = self.uri.clone();

        let negotiated = Self::required(
            self.executor
                .execute(OperationKind::Connect, move || {
                    let transport = transport.clone();
                    let uri = uri.clone();
                    let events = events.clone();
                    async move {
                        let guard = transport.lock().await;
                        negotiator.negotiate(&*guard, &uri, events).await
                    }
                })
                .await?,
        )?;

        self.session_active.store(true, Ordering::SeqCst);
        self.executor.link().mark_connected();
        info!(uri = %self.uri, strategy = negotiated.strategy, "endpoint initialized");
        Ok(negotiated)
    }

    /// Closes the session. Best effort, bounded by the per-call timeout
    /// but outside the retry loop so shutdown is never skipped by the stop
    /// token.
    pub async fn disconnect(&self) {
        let close = async {
            let guard = self.transport.lock().await;
            guard.close().await
        };
        let timeout = self.executor.policy().timeout;
        match tokio::time::timeout(timeout, close).await {
            Ok(Ok(())) => debug!(uri = %self.uri, "endpoint disconnected"),
            Ok(Err(error)) => warn!(uri = %self.uri, error = %error, "close failed"),
            Err(_) => warn!(uri = %self.uri, "close timed out"),
        }
        self.session_active.store(false, Ordering::SeqCst);
        self.subscriptions.lock().clear();
    }

    // =========================================================================
    // Attribute Operations
    // =========================================================================

    /// Reads a node's value and quality.
    pub async fn read(&self, address: &NodeAddress) -> ClientResult<(Value, Quality)> {
        let transport = self.transport.clone();
        let address = address.clone();
        Self::required(
            self.executor
                .execute(OperationKind::Read, move || {
                    let transport = transport.clone();
                    let address = address.clone();
                    async move { transport.lock().await.read(&address).await }
                })
                .await?,
        )
    }

    /// Writes a node's value. Returns the server's accept flag.
    pub async fn write(&self, address: &NodeAddress, value: Value) -> ClientResult<bool> {
        let transport = self.transport.clone();
        let address = address.clone();
        Self::required(
            self.executor
                .execute(OperationKind::Write, move || {
                    let transport = transport.clone();
                    let address = address.clone();
                    let value = value.clone();
                    async move { transport.lock().await.write(&address, value).await }
                })
                .await?,
        )
    }

    /// Calls a method on an object node.
    pub async fn call_method(
        &self,
        object: &NodeAddress,
        method: &NodeAddress,
        args: Vec<Value>,
    ) -> ClientResult<(bool, Vec<Value>)> {
        let transport = self.transport.clone();
        let object = object.clone();
        let method = method.clone();
        Self::required(
            self.executor
                .execute(OperationKind::Call, move || {
                    let transport = transport.clone();
                    let object = object.clone();
                    let method = method.clone();
                    let args = args.clone();
                    async move {
                        transport
                            .lock()
                            .await
                            .call_method(&object, &method, args)
                            .await
                    }
                })
                .await?,
        )
    }

    /// Resolves the parent object of a method node.
    ///
    /// A method with no parent cannot be invoked; that is a configuration
    /// problem, not a communication one.
    pub async fn browse_parent_object(&self, node: &NodeAddress) -> ClientResult<NodeAddress> {
        let transport = self.transport.clone();
        let lookup = node.clone();
        let parent = Self::required(
            self.executor
                .execute(OperationKind::Browse, move || {
                    let transport = transport.clone();
                    let lookup = lookup.clone();
                    async move { transport.lock().await.browse_parent(&lookup).await }
                })
                .await?,
        )?;

        parent.ok_or_else(|| ConfigurationError::orphan_method_node(node).into())
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Creates a subscription and records its handle.
    pub async fn create_subscription(
        &self,
        publish_interval: Duration,
    ) -> ClientResult<SubscriptionHandle> {
        let transport = self.transport.clone();
        let handle = Self::required(
            self.executor
                .execute(OperationKind::Subscribe, move || {
                    let transport = transport.clone();
                    async move {
                        transport
                            .lock()
                            .await
                            .create_subscription(publish_interval)
                            .await
                    }
                })
                .await?,
        )?;

        self.subscriptions.lock().insert(handle);
        debug!(uri = %self.uri, %handle, "subscription created");
        Ok(handle)
    }

    /// Deletes a subscription and forgets its handle.
    pub async fn delete_subscription(&self, handle: SubscriptionHandle) -> ClientResult<()> {
        let transport = self.transport.clone();
        Self::required(
            self.executor
                .execute(OperationKind::Subscribe, move || {
                    let transport = transport.clone();
                    async move { transport.lock().await.delete_subscription(handle).await }
                })
                .await?,
        )?;

        self.subscriptions.lock().remove(&handle);
        debug!(uri = %self.uri, %handle, "subscription deleted");
        Ok(())
    }

    /// Creates monitored items in one batch, returning one status per
    /// definition.
    pub async fn subscribe_items(
        &self,
        handle: SubscriptionHandle,
        definitions: Vec<ItemDefinition>,
    ) -> ClientResult<Vec<ItemStatus>> {
        let transport = self.transport.clone();
        Self::required(
            self.executor
                .execute(OperationKind::Subscribe, move || {
                    let transport = transport.clone();
                    let definitions = definitions.clone();
                    async move {
                        transport
                            .lock()
                            .await
                            .create_items(handle, &definitions)
                            .await
                    }
                })
                .await?,
        )
    }

    /// Deletes one monitored item.
    pub async fn delete_item(
        &self,
        handle: SubscriptionHandle,
        client_handle: u32,
    ) -> ClientResult<()> {
        let transport = self.transport.clone();
        Self::required(
            self.executor
                .execute(OperationKind::Subscribe, move || {
                    let transport = transport.clone();
                    async move {
                        transport
                            .lock()
                            .await
                            .delete_item(handle, client_handle)
                            .await
                    }
                })
                .await?,
        )
    }

    /// Asks the server whether a subscription survived a session transfer.
    pub async fn subscription_current(&self, handle: SubscriptionHandle) -> ClientResult<bool> {
        let transport = self.transport.clone();
        Self::required(
            self.executor
                .execute(OperationKind::Subscribe, move || {
                    let transport = transport.clone();
                    async move { transport.lock().await.subscription_current(handle).await }
                })
                .await?,
        )
    }

    /// Queries advertised redundancy support.
    pub async fn redundancy_support(&self) -> ClientResult<RedundancySupport> {
        let transport = self.transport.clone();
        Self::required(
            self.executor
                .execute(OperationKind::Read, move || {
                    let transport = transport.clone();
                    async move { transport.lock().await.redundancy_support().await }
                })
                .await?,
        )
    }
}

impl<T> std::fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("uri", &self.uri)
            .field("session_active", &self.session_active.load(Ordering::SeqCst))
            .finish()
    }
}
