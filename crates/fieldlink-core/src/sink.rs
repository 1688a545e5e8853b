// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Outward event delivery.
//!
//! The client pushes value updates, tag diagnostics and equipment-state
//! transitions to the host through an [`EventSink`]. Channel-backed
//! implementations are provided; hosts with their own dispatch implement
//! the trait directly.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::types::{DataPoint, EquipmentState, Quality, TagId};

// =============================================================================
// EventSink
// =============================================================================

/// Receiver of client events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Called for each changed value on a subscribed tag.
    async fn on_value_update(&self, point: DataPoint);

    /// Called when a tag could not be subscribed or read.
    async fn on_tag_invalid(&self, _tag: TagId, _quality: Quality) {
        // Default: no-op
    }

    /// Called when the equipment connection state changes.
    async fn on_equipment_state(&self, _state: EquipmentState) {
        // Default: no-op
    }

    /// Called on periodic liveness ticks.
    async fn on_heartbeat(&self) {
        // Default: no-op
    }
}

// =============================================================================
// SinkEvent
// =============================================================================

/// A single sink event, used by the channel-backed implementations.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// A changed value on a subscribed tag.
    ValueUpdate(DataPoint),
    /// A tag that could not be subscribed or read.
    TagInvalid {
        /// The failing tag.
        tag: TagId,
        /// Quality reported for the failure.
        quality: Quality,
    },
    /// An equipment connection-state transition.
    EquipmentState(EquipmentState),
    /// A liveness tick.
    Heartbeat,
}

// =============================================================================
// ChannelSink
// =============================================================================

/// A channel-based sink delivering to a single consumer.
pub struct ChannelSink {
    sender: mpsc::Sender<SinkEvent>,
}

impl ChannelSink {
    /// Creates a sink from an existing sender.
    pub fn new(sender: mpsc::Sender<SinkEvent>) -> Self {
        Self { sender }
    }

    /// Creates a sink together with its receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn on_value_update(&self, point: DataPoint) {
        // Best effort send, ignore errors
        let _ = self.sender.send(SinkEvent::ValueUpdate(point)).await;
    }

    async fn on_tag_invalid(&self, tag: TagId, quality: Quality) {
        let _ = self.sender.send(SinkEvent::TagInvalid { tag, quality }).await;
    }

    async fn on_equipment_state(&self, state: EquipmentState) {
        let _ = self.sender.send(SinkEvent::EquipmentState(state)).await;
    }

    async fn on_heartbeat(&self) {
        let _ = self.sender.send(SinkEvent::Heartbeat).await;
    }
}

// =============================================================================
// BroadcastSink
// =============================================================================

/// A broadcast-based sink for multiple consumers.
pub struct BroadcastSink {
    sender: broadcast::Sender<SinkEvent>,
}

impl BroadcastSink {
    /// Creates a broadcast sink.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to events.
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn on_value_update(&self, point: DataPoint) {
        // Best effort send, ignore errors (no receivers is ok)
        let _ = self.sender.send(SinkEvent::ValueUpdate(point));
    }

    async fn on_tag_invalid(&self, tag: TagId, quality: Quality) {
        let _ = self.sender.send(SinkEvent::TagInvalid { tag, quality });
    }

    async fn on_equipment_state(&self, state: EquipmentState) {
        let _ = self.sender.send(SinkEvent::EquipmentState(state));
    }

    async fn on_heartbeat(&self) {
        let _ = self.sender.send(SinkEvent::Heartbeat);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn sample_point(tag: &str) -> DataPoint {
        DataPoint::new(TagId::new(tag), Value::Double(1.5), Quality::Good)
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_events_in_order() {
        let (sink, mut rx) = ChannelSink::with_channel(8);

        sink.on_value_update(sample_point("FIC-101.PV")).await;
        sink.on_tag_invalid(TagId::new("TI-202.PV"), Quality::Bad).await;
        sink.on_equipment_state(EquipmentState::ConnectionLost).await;

        assert!(matches!(rx.recv().await.unwrap(), SinkEvent::ValueUpdate(p)
            if p.tag.as_str() == "FIC-101.PV"));
        assert!(matches!(rx.recv().await.unwrap(), SinkEvent::TagInvalid { tag, quality }
            if tag.as_str() == "TI-202.PV" && quality == Quality::Bad));
        assert_eq!(
            rx.recv().await.unwrap(),
            SinkEvent::EquipmentState(EquipmentState::ConnectionLost)
        );
    }

    #[tokio::test]
    async fn test_broadcast_sink_fans_out() {
        let sink = BroadcastSink::new(8);
        let mut rx1 = sink.subscribe();
        let mut rx2 = sink.subscribe();

        sink.on_heartbeat().await;

        assert_eq!(rx1.recv().await.unwrap(), SinkEvent::Heartbeat);
        assert_eq!(rx2.recv().await.unwrap(), SinkEvent::Heartbeat);
    }

    #[tokio::test]
    async fn test_channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelSink::with_channel(1);
        drop(rx);
        // Must not panic or error.
        sink.on_value_update(sample_point("PI-303.PV")).await;
    }
}
