// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tag subscription bookkeeping.
//!
//! The registry owns the mapping between platform tags and protocol
//! monitored items: `tag ↔ client handle ↔ item definition`, plus the
//! sampling-interval groups that share one subscription each. Client
//! handles are allocated once per tag and stay stable across resubscribes
//! and server switches, so in-flight notifications keep resolving to the
//! right tag.
//!
//! All mutation is serialized through one async mutex; the registry is the
//! single owner of its maps.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use fieldlink_core::config::ClientConfig;
use fieldlink_core::error::{ClientError, ClientResult, ConfigurationError};
use fieldlink_core::sink::EventSink;
use fieldlink_core::types::{DataPoint, Deadband, NodeAddress, Quality, TagId};

use crate::endpoint::Endpoint;
use crate::transport::{DataChange, ItemDefinition, ServerTransport, SubscriptionHandle};

// =============================================================================
// TagConfig
// =============================================================================

/// What the host wants monitored for one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TagConfig {
    /// Platform tag id.
    pub tag: TagId,

    /// Node to monitor.
    pub address: NodeAddress,

    /// Requested sampling interval; clamped to the configured floor.
    pub sampling_interval: Duration,

    /// Change filter.
    pub deadband: Deadband,
}

impl TagConfig {
    /// Creates a tag config with no deadband.
    pub fn new(tag: impl Into<TagId>, address: NodeAddress, sampling_interval: Duration) -> Self {
        Self {
            tag: tag.into(),
            address,
            sampling_interval,
            deadband: Deadband::none(),
        }
    }

    /// Sets the deadband.
    pub fn with_deadband(mut self, deadband: Deadband) -> Self {
        self.deadband = deadband;
        self
    }
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug, Clone)]
struct TagEntry {
    client_handle: u32,
    address: NodeAddress,
    deadband: Deadband,
    group_key: u64,
}

#[derive(Debug, Default)]
struct Group {
    handle: Option<SubscriptionHandle>,
    members: HashSet<TagId>,
}

#[derive(Debug)]
struct RegistryState {
    next_handle: u32,
    entries: HashMap<TagId, TagEntry>,
    by_handle: HashMap<u32, TagId>,
    groups: BTreeMap<u64, Group>,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            next_handle: 1,
            entries: HashMap::new(),
            by_handle: HashMap::new(),
            groups: BTreeMap::new(),
        }
    }

    fn allocate_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

// =============================================================================
// TagSubscriptionRegistry
// =============================================================================

/// Owner of tag → monitored-item state for one client.
pub struct TagSubscriptionRegistry {
    config: ClientConfig,
    sink: Arc<dyn EventSink>,
    state: Mutex<RegistryState>,
}

impl TagSubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new(config: ClientConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            sink,
            state: Mutex::new(RegistryState::new()),
        }
    }

    /// Number of tags currently registered (members or not).
    pub async fn tag_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// The subscription handle of the group a tag belongs to, if any.
    pub async fn group_handle_of(&self, tag: &TagId) -> Option<SubscriptionHandle> {
        let state = self.state.lock().await;
        let entry = state.entries.get(tag)?;
        state.groups.get(&entry.group_key)?.handle
    }

    /// Returns `true` when the tag is a live member of its group.
    pub async fn is_member(&self, tag: &TagId) -> bool {
        let state = self.state.lock().await;
        match state.entries.get(tag) {
            Some(entry) => state
                .groups
                .get(&entry.group_key)
                .map(|g| g.members.contains(tag))
                .unwrap_or(false),
            None => false,
        }
    }

    // =========================================================================
    // Subscribe
    // =========================================================================

    /// Subscribes a batch of tags on `endpoint`.
    ///
    /// Tags are grouped by clamped sampling interval; each group shares one
    /// subscription. Per-item failures become tag-invalid notifications and
    /// never fail the batch.
    pub async fn subscribe_tags<T: ServerTransport + 'static>(
        &self,
        endpoint: &Endpoint<T>,
        tags: Vec<TagConfig>,
    ) -> ClientResult<()> {
        if tags.is_empty() {
            return Err(ConfigurationError::EmptyTagSet.into());
        }

        let mut state = self.state.lock().await;

        // Resolve entries and bucket the new work by group.
        let mut per_group: BTreeMap<u64, Vec<TagId>> = BTreeMap::new();
        for tag_config in tags {
            let key = self
                .config
                .clamp_sampling_interval(tag_config.sampling_interval)
                .as_millis() as u64;

            match state.entries.get(&tag_config.tag).map(|e| e.group_key) {
                Some(old_key) => {
                    // Handle stays stable; the definition may move groups.
                    // A move deletes the old item first so the server does
                    // not keep streaming it from the old subscription.
                    if old_key != key {
                        self.leave_group(endpoint, &mut state, &tag_config.tag, old_key)
                            .await?;
                    }
                    if let Some(existing) = state.entries.get_mut(&tag_config.tag) {
                        existing.address = tag_config.address.clone();
                        existing.deadband = tag_config.deadband;
                        existing.group_key = key;
                    }
                }
                None => {
                    let client_handle = state.allocate_handle();
                    state.entries.insert(
                        tag_config.tag.clone(),
                        TagEntry {
                            client_handle,
                            address: tag_config.address.clone(),
                            deadband: tag_config.deadband,
                            group_key: key,
                        },
                    );
                    state.by_handle.insert(client_handle, tag_config.tag.clone());
                }
            }
            per_group.entry(key).or_default().push(tag_config.tag);
        }

        for (key, tags) in per_group {
            self.subscribe_group(endpoint, &mut state, key, tags).await?;
        }

        Ok(())
    }

    /// Ensures `key`'s group has a current subscription and creates items
    /// for the given tags.
    async fn subscribe_group<T: ServerTransport + 'static>(
        &self,
        endpoint: &Endpoint<T>,
        state: &mut RegistryState,
        key: u64,
        tags: Vec<TagId>,
    ) -> ClientResult<()> {
        let handle = self.ensure_group_handle(endpoint, state, key).await?;

        let definitions: Vec<ItemDefinition> = tags
            .iter()
            .filter_map(|tag| {
                state.entries.get(tag).map(|entry| ItemDefinition {
                    tag: tag.clone(),
                    client_handle: entry.client_handle,
                    address: entry.address.clone(),
                    sampling_interval: Duration::from_millis(key),
                    deadband: entry.deadband,
                })
            })
            .collect();

        let statuses = endpoint.subscribe_items(handle, definitions).await?;

        let group = state.groups.entry(key).or_default();
        for status in statuses {
            let Some(tag) = state.by_handle.get(&status.client_handle).cloned() else {
                continue;
            };
            if status.is_good() {
                group.members.insert(tag);
            } else {
                let quality = Quality::from_status(status.status_code);
                warn!(tag = %tag, status = status.status_code, "item rejected by server");
                self.sink.on_tag_invalid(tag, quality).await;
            }
        }

        Ok(())
    }

    /// Returns a live handle for the group, creating the subscription when
    /// absent or when the known handle went stale across a session
    /// transfer.
    async fn ensure_group_handle<T: ServerTransport + 'static>(
        &self,
        endpoint: &Endpoint<T>,
        state: &mut RegistryState,
        key: u64,
    ) -> ClientResult<SubscriptionHandle> {
        if let Some(existing) = state.groups.get(&key).and_then(|g| g.handle) {
            if endpoint.subscription_current(existing).await? {
                return Ok(existing);
            }
            debug!(%existing, interval_ms = key, "group handle stale, recreating");
        }

        let handle = endpoint
            .create_subscription(Duration::from_millis(key))
            .await?;
        state.groups.entry(key).or_default().handle = Some(handle);
        info!(%handle, interval_ms = key, "subscription group created");
        Ok(handle)
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Removes a tag. Returns `false` when the tag was never registered.
    ///
    /// The last member leaving a group tears the group's subscription down.
    pub async fn remove_tag<T: ServerTransport + 'static>(
        &self,
        endpoint: &Endpoint<T>,
        tag: &TagId,
    ) -> ClientResult<bool> {
        let mut state = self.state.lock().await;

        let Some(entry) = state.entries.get(tag).cloned() else {
            return Ok(false);
        };

        self.leave_group(endpoint, &mut state, tag, entry.group_key).await?;

        state.entries.remove(tag);
        state.by_handle.remove(&entry.client_handle);
        Ok(true)
    }

    /// Deletes a tag's item from the group under `key`, tearing the group
    /// down when the last member leaves.
    ///
    /// A member group always carries a handle; non-members (including tags
    /// whose item creation was rejected) need no network calls.
    async fn leave_group<T: ServerTransport + 'static>(
        &self,
        endpoint: &Endpoint<T>,
        state: &mut RegistryState,
        tag: &TagId,
        key: u64,
    ) -> ClientResult<()> {
        let Some(client_handle) = state.entries.get(tag).map(|e| e.client_handle) else {
            return Ok(());
        };

        let member_handle = state
            .groups
            .get(&key)
            .filter(|g| g.members.contains(tag))
            .and_then(|g| g.handle);
        let Some(handle) = member_handle else {
            return Ok(());
        };

        endpoint.delete_item(handle, client_handle).await?;

        if let Some(group) = state.groups.get_mut(&key) {
            group.members.remove(tag);
            if group.members.is_empty() {
                endpoint.delete_subscription(handle).await?;
                state.groups.remove(&key);
                info!(%handle, interval_ms = key, "empty group torn down");
            }
        }
        Ok(())
    }

    // =========================================================================
    // Recreate & Resubscribe
    // =========================================================================

    /// Rebuilds the group whose subscription handle went bad.
    ///
    /// An unknown handle or an empty group fails with a configuration
    /// error before any network traffic.
    pub async fn recreate_subscription<T: ServerTransport + 'static>(
        &self,
        endpoint: &Endpoint<T>,
        old_handle: SubscriptionHandle,
    ) -> ClientResult<()> {
        let mut state = self.state.lock().await;

        let found = state
            .groups
            .iter_mut()
            .find(|(_, g)| g.handle == Some(old_handle) && !g.members.is_empty())
            .map(|(key, group)| {
                group.handle = None;
                (*key, group.members.drain().collect::<Vec<TagId>>())
            });
        let Some((key, members)) = found else {
            return Err(ConfigurationError::EmptySubscriptionGroup {
                handle: old_handle.0,
            }
            .into());
        };

        // The old handle is already dead server-side more often than not.
        if let Err(error) = endpoint.delete_subscription(old_handle).await {
            debug!(%old_handle, error = %error, "stale handle delete failed, continuing");
        }

        info!(%old_handle, interval_ms = key, members = members.len(), "recreating subscription");
        self.subscribe_group(endpoint, &mut state, key, members).await
    }

    /// Replays every non-empty group on a freshly connected endpoint.
    ///
    /// Old handles are dropped without delete calls; they belonged to a
    /// server we are no longer talking to.
    pub async fn resubscribe_all<T: ServerTransport + 'static>(
        &self,
        endpoint: &Endpoint<T>,
    ) -> ClientResult<()> {
        let mut state = self.state.lock().await;

        let work: Vec<(u64, Vec<TagId>)> = state
            .groups
            .iter_mut()
            .filter(|(_, g)| !g.members.is_empty())
            .map(|(key, group)| {
                group.handle = None;
                (*key, group.members.drain().collect())
            })
            .collect();

        for (key, members) in work {
            self.subscribe_group(endpoint, &mut state, key, members).await?;
        }

        Ok(())
    }

    // =========================================================================
    // Refresh & Dispatch
    // =========================================================================

    /// Reads every tag once and pushes the result to the sink.
    ///
    /// Per-tag failures become tag-invalid notifications; only a stop
    /// aborts the batch.
    pub async fn refresh<T: ServerTransport + 'static>(
        &self,
        endpoint: &Endpoint<T>,
        tags: &[TagId],
    ) -> ClientResult<()> {
        for tag in tags {
            let address = {
                let state = self.state.lock().await;
                state.entries.get(tag).map(|e| e.address.clone())
            };

            let Some(address) = address else {
                warn!(tag = %tag, "refresh requested for unknown tag");
                self.sink.on_tag_invalid(tag.clone(), Quality::Bad).await;
                continue;
            };

            match endpoint.read(&address).await {
                Ok((value, quality)) => {
                    self.sink
                        .on_value_update(DataPoint::new(tag.clone(), value, quality))
                        .await;
                }
                Err(ClientError::Stopped) => return Ok(()),
                Err(error) => {
                    warn!(tag = %tag, error = %error, "refresh read failed");
                    self.sink.on_tag_invalid(tag.clone(), Quality::Bad).await;
                }
            }
        }
        Ok(())
    }

    /// Routes a data change to its tag's sink notification.
    ///
    /// Unknown handles are logged and dropped; they are expected briefly
    /// around item deletion.
    pub async fn dispatch_update(&self, change: DataChange) {
        let tag = {
            let state = self.state.lock().await;
            state.by_handle.get(&change.client_handle).cloned()
        };

        match tag {
            Some(tag) => {
                self.sink
                    .on_value_update(DataPoint {
                        tag,
                        value: change.value,
                        quality: change.quality,
                        timestamp: change.timestamp,
                    })
                    .await;
            }
            None => {
                debug!(
                    client_handle = change.client_handle,
                    "dropping update for unknown handle"
                );
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use fieldlink_core::error::ClientError;
    use fieldlink_core::retry::{LinkState, RetryExecutor, RetryPolicy};
    use fieldlink_core::shutdown::StopToken;
    use fieldlink_core::sink::{ChannelSink, SinkEvent};
    use fieldlink_core::types::Value;
    use tokio::sync::mpsc;

    use crate::transport::{
        AccessPoint, Credentials, ItemStatus, RedundancySupport, SessionEvent,
    };

    /// Transport that fails every call; used to prove code paths that must
    /// not touch the network.
    struct UnreachableTransport;

    #[async_trait]
    impl ServerTransport for UnreachableTransport {
        async fn discover_access_points(&self, _uri: &str) -> ClientResult<Vec<AccessPoint>> {
            Err(ClientError::request_failed("discover", "unexpected call"))
        }
        async fn connect(
            &self,
            _uri: &str,
            _point: &AccessPoint,
            _credentials: &Credentials,
            _events: mpsc::Sender<SessionEvent>,
        ) -> ClientResult<()> {
            Err(ClientError::request_failed("connect", "unexpected call"))
        }
        async fn close(&self) -> ClientResult<()> {
            Ok(())
        }
        async fn read(&self, _address: &NodeAddress) -> ClientResult<(Value, Quality)> {
            Err(ClientError::request_failed("read", "unexpected call"))
        }
        async fn write(&self, _address: &NodeAddress, _value: Value) -> ClientResult<bool> {
            Err(ClientError::request_failed("write", "unexpected call"))
        }
        async fn call_method(
            &self,
            _object: &NodeAddress,
            _method: &NodeAddress,
            _args: Vec<Value>,
        ) -> ClientResult<(bool, Vec<Value>)> {
            Err(ClientError::request_failed("call", "unexpected call"))
        }
        async fn browse_parent(&self, _node: &NodeAddress) -> ClientResult<Option<NodeAddress>> {
            Err(ClientError::request_failed("browse", "unexpected call"))
        }
        async fn create_subscription(
            &self,
            _publish_interval: Duration,
        ) -> ClientResult<SubscriptionHandle> {
            Err(ClientError::request_failed("create_subscription", "unexpected call"))
        }
        async fn delete_subscription(&self, _handle: SubscriptionHandle) -> ClientResult<()> {
            Err(ClientError::request_failed("delete_subscription", "unexpected call"))
        }
        async fn create_items(
            &self,
            _handle: SubscriptionHandle,
            _definitions: &[ItemDefinition],
        ) -> ClientResult<Vec<ItemStatus>> {
            Err(ClientError::request_failed("create_items", "unexpected call"))
        }
        async fn delete_item(
            &self,
            _handle: SubscriptionHandle,
            _client_handle: u32,
        ) -> ClientResult<()> {
            Err(ClientError::request_failed("delete_item", "unexpected call"))
        }
        async fn subscription_current(&self, _handle: SubscriptionHandle) -> ClientResult<bool> {
            Err(ClientError::request_failed("subscription_current", "unexpected call"))
        }
        async fn redundancy_support(&self) -> ClientResult<RedundancySupport> {
            Err(ClientError::request_failed("redundancy_support", "unexpected call"))
        }
    }

    fn offline_endpoint() -> Endpoint<UnreachableTransport> {
        let policy = RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(100));
        Endpoint::new(
            "opc.tcp://test:4840",
            UnreachableTransport,
            RetryExecutor::new(policy, LinkState::new(), StopToken::new()),
        )
    }

    #[tokio::test]
    async fn test_empty_tag_set_rejected_without_network_calls() {
        let (sink, _rx) = ChannelSink::with_channel(8);
        let registry = TagSubscriptionRegistry::new(ClientConfig::default(), Arc::new(sink));

        let result = registry.subscribe_tags(&offline_endpoint(), Vec::new()).await;
        assert!(matches!(
            result,
            Err(ClientError::Configuration(ConfigurationError::EmptyTagSet))
        ));
    }

    #[tokio::test]
    async fn test_recreate_unknown_handle_is_configuration_error() {
        let (sink, _rx) = ChannelSink::with_channel(8);
        let registry = TagSubscriptionRegistry::new(ClientConfig::default(), Arc::new(sink));

        // UnreachableTransport proves no network call is made.
        let result = registry
            .recreate_subscription(&offline_endpoint(), SubscriptionHandle(99))
            .await;
        assert!(matches!(
            result,
            Err(ClientError::Configuration(
                ConfigurationError::EmptySubscriptionGroup { handle: 99 }
            ))
        ));
    }

    #[tokio::test]
    async fn test_remove_unknown_tag_returns_false() {
        let (sink, _rx) = ChannelSink::with_channel(8);
        let registry = TagSubscriptionRegistry::new(ClientConfig::default(), Arc::new(sink));

        let removed = registry
            .remove_tag(&offline_endpoint(), &TagId::new("nope"))
            .await
            .unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_handle_is_dropped() {
        let (sink, mut rx) = ChannelSink::with_channel(8);
        let registry = TagSubscriptionRegistry::new(ClientConfig::default(), Arc::new(sink));

        registry
            .dispatch_update(DataChange {
                client_handle: 4242,
                value: Value::Int32(1),
                quality: Quality::Good,
                timestamp: Utc::now(),
            })
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refresh_unknown_tag_reports_invalid() {
        let (sink, mut rx) = ChannelSink::with_channel(8);
        let registry = TagSubscriptionRegistry::new(ClientConfig::default(), Arc::new(sink));

        registry
            .refresh(&offline_endpoint(), &[TagId::new("ghost")])
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            SinkEvent::TagInvalid { tag, quality }
                if tag.as_str() == "ghost" && quality == Quality::Bad
        ));
    }
}
