use std::sync::Arc;

use serde_json::json;
use time::OffsetDateTime;

use super::builder::{adapter_type_name, is_health_report, parse_health_report};
use super::message::MeshMessage;
use super::registry::{format_mac, NodeRegistry};
use super::{
    ADAPTER_TYPE_PIR, ADAPTER_TYPE_SERIAL, MESSAGE_TYPE_ADAPTER_DATA, MESSAGE_TYPE_MASTER_BEACON,
    OP_HEALTH_REPORT,
};
use crate::errors::MeshError;
use crate::services::event_sink::EventSink;

/// Topic receiving an envelope record for every frame, in or out.
pub const TOPIC_MESH_MESSAGES: &str = "mesh-messages";
/// Topic receiving PIR motion events.
pub const TOPIC_MOTION_TRIGGER: &str = "motion-trigger";

/// Routes inbound mesh messages to the registry and the event bus.
///
/// Dispatch is serial: the read loop is the only caller, so registry updates
/// and bus publishes happen in arrival order.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<NodeRegistry>,
    sink: Option<Arc<dyn EventSink>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<NodeRegistry>, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self { registry, sink }
    }

    pub async fn dispatch(&self, msg: &MeshMessage) -> Result<(), MeshError> {
        self.log_envelope(msg, "incoming").await;

        match msg.message_type {
            MESSAGE_TYPE_ADAPTER_DATA => self.handle_adapter_data(msg).await,
            MESSAGE_TYPE_MASTER_BEACON => {
                tracing::info!("master beacon from {}", format_mac(&msg.origin_mac));
                Ok(())
            }
            other => {
                tracing::info!("unknown message type: {}", other);
                Ok(())
            }
        }
    }

    async fn handle_adapter_data(&self, msg: &MeshMessage) -> Result<(), MeshError> {
        match msg.data_type {
            ADAPTER_TYPE_SERIAL => self.handle_serial_data(msg),
            ADAPTER_TYPE_PIR => {
                self.handle_pir_data(msg).await;
                Ok(())
            }
            other => {
                tracing::info!(
                    "adapter data from {}: type={} data={:02x?}",
                    format_mac(&msg.origin_mac),
                    adapter_type_name(other),
                    msg.data,
                );
                Ok(())
            }
        }
    }

    fn handle_serial_data(&self, msg: &MeshMessage) -> Result<(), MeshError> {
        let Some(&opcode) = msg.data.first() else {
            tracing::warn!("empty serial payload from {}", format_mac(&msg.origin_mac));
            return Ok(());
        };

        match opcode {
            OP_HEALTH_REPORT => {
                let report = parse_health_report(msg)?;

                self.registry.update(
                    &report.mac,
                    report.adapter_type,
                    report.uptime,
                    report.hop_count,
                );

                tracing::info!(
                    "health report from {}: type={} uptime={}s hops={}",
                    format_mac(&report.mac),
                    adapter_type_name(report.adapter_type),
                    report.uptime,
                    report.hop_count,
                );

                Ok(())
            }
            other => {
                tracing::info!("unknown serial opcode: {:#04x}", other);
                Ok(())
            }
        }
    }

    async fn handle_pir_data(&self, msg: &MeshMessage) {
        tracing::info!(
            "PIR motion detected from {} (hops: {})",
            format_mac(&msg.origin_mac),
            msg.hop_count,
        );

        let event = json!({
            "type": "pir_motion",
            "mac": format_mac(&msg.origin_mac),
            "timestamp": OffsetDateTime::now_utc().unix_timestamp(),
            "hopCount": msg.hop_count,
            "data": msg.data,
        });

        self.publish(TOPIC_MOTION_TRIGGER, &event).await;
    }

    /// Publishes the structured envelope record for a frame, best-effort.
    pub async fn log_envelope(&self, msg: &MeshMessage, direction: &str) {
        let mut entry = json!({
            "timestamp": OffsetDateTime::now_utc().unix_timestamp(),
            "direction": direction,
            "messageType": msg.message_type,
            "dataType": msg.data_type,
            "origin": format_mac(&msg.origin_mac),
            "target": format_mac(&msg.target_mac),
            "lastHop": format_mac(&msg.last_hop_mac),
            "hopCount": msg.hop_count,
            "dataLength": msg.data.len(),
        });

        if is_health_report(msg) {
            if let Ok(report) = parse_health_report(msg) {
                entry["healthReport"] = json!({
                    "mac": format_mac(&report.mac),
                    "adapterType": adapter_type_name(report.adapter_type),
                    "uptime": report.uptime,
                });
            }
        }

        self.publish(TOPIC_MESH_MESSAGES, &entry).await;
    }

    async fn publish(&self, topic: &str, payload: &serde_json::Value) {
        let Some(sink) = &self.sink else {
            return;
        };

        if let Err(e) = sink.publish(topic, payload.to_string().into_bytes()).await {
            tracing::warn!("failed to publish to {}: {}", topic, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{builder, MAX_DATA_LEN, MESSAGE_TYPE_SERIAL_CMD_BROADCAST};
    use crate::services::event_sink::SinkError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl RecordingSink {
        fn on_topic(&self, topic: &str) -> Vec<serde_json::Value> {
            self.published
                .lock()
                .iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn connect(&self) -> Result<(), SinkError> {
            Ok(())
        }

        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SinkError> {
            self.published.lock().push((topic.to_string(), payload));
            Ok(())
        }

        async fn subscribe(&self, _topic: &str) -> Result<(), SinkError> {
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn connect(&self) -> Result<(), SinkError> {
            Ok(())
        }

        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), SinkError> {
            Err("bus down".into())
        }

        async fn subscribe(&self, _topic: &str) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<NodeRegistry>, Arc<RecordingSink>) {
        let registry = Arc::new(NodeRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(registry.clone(), Some(sink.clone()));
        (dispatcher, registry, sink)
    }

    fn health_report_message(mac: &[u8; 6], adapter_type: i32, uptime: u32) -> MeshMessage {
        let mut data = vec![0u8; MAX_DATA_LEN];
        data[0] = OP_HEALTH_REPORT;
        data[1] = adapter_type as u8;
        data[2..8].copy_from_slice(mac);
        data[8..12].copy_from_slice(&uptime.to_le_bytes());

        MeshMessage {
            message_type: MESSAGE_TYPE_ADAPTER_DATA,
            data_type: ADAPTER_TYPE_SERIAL,
            origin_mac: mac.to_vec(),
            hop_count: 1,
            data,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_pir_message_publishes_exactly_one_motion_event() {
        let (dispatcher, _, sink) = dispatcher();

        let msg = MeshMessage {
            message_type: MESSAGE_TYPE_ADAPTER_DATA,
            data_type: ADAPTER_TYPE_PIR,
            origin_mac: vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
            hop_count: 3,
            data: vec![0x01],
            ..Default::default()
        };

        dispatcher.dispatch(&msg).await.unwrap();

        let events = sink.on_topic(TOPIC_MOTION_TRIGGER);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "pir_motion");
        assert_eq!(events[0]["mac"], "11:22:33:44:55:66");
        assert_eq!(events[0]["hopCount"], 3);
    }

    #[tokio::test]
    async fn test_health_report_updates_registry() {
        let (dispatcher, registry, _) = dispatcher();
        let mac = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

        dispatcher
            .dispatch(&health_report_message(&mac, ADAPTER_TYPE_PIR, 4112))
            .await
            .unwrap();

        let node = registry.get(&mac).unwrap();
        assert_eq!(node.adapter_type, ADAPTER_TYPE_PIR);
        assert_eq!(node.uptime, 4112);
        assert_eq!(node.hop_count, 1);
    }

    #[tokio::test]
    async fn test_every_inbound_message_is_logged_to_the_bus() {
        let (dispatcher, _, sink) = dispatcher();
        let mac = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

        dispatcher
            .dispatch(&health_report_message(&mac, ADAPTER_TYPE_PIR, 7))
            .await
            .unwrap();

        let entries = sink.on_topic(TOPIC_MESH_MESSAGES);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["direction"], "incoming");
        assert_eq!(entries[0]["origin"], "11:22:33:44:55:66");
        assert_eq!(entries[0]["dataLength"], 12);
        assert_eq!(entries[0]["healthReport"]["adapterType"], "PIR");
        assert_eq!(entries[0]["healthReport"]["uptime"], 7);
    }

    #[tokio::test]
    async fn test_master_beacon_needs_no_sink() {
        let registry = Arc::new(NodeRegistry::new());
        let dispatcher = Dispatcher::new(registry, None);

        let msg = MeshMessage {
            message_type: MESSAGE_TYPE_MASTER_BEACON,
            origin_mac: vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
            ..Default::default()
        };

        dispatcher.dispatch(&msg).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let registry = Arc::new(NodeRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone(), Some(Arc::new(FailingSink)));
        let mac = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

        dispatcher
            .dispatch(&health_report_message(&mac, ADAPTER_TYPE_PIR, 9))
            .await
            .unwrap();

        // Core semantics are unaffected by the failing bus.
        assert!(registry.get(&mac).is_some());
    }

    #[tokio::test]
    async fn test_malformed_health_report_is_dropped() {
        let (dispatcher, registry, _) = dispatcher();

        let msg = MeshMessage {
            message_type: MESSAGE_TYPE_ADAPTER_DATA,
            data_type: ADAPTER_TYPE_SERIAL,
            data: vec![OP_HEALTH_REPORT, 0x00, 0x01],
            ..Default::default()
        };

        assert!(dispatcher.dispatch(&msg).await.is_err());
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_types_are_ignored() {
        let (dispatcher, registry, sink) = dispatcher();

        let unknown_type = MeshMessage {
            message_type: 42,
            ..Default::default()
        };
        dispatcher.dispatch(&unknown_type).await.unwrap();

        let unknown_adapter = MeshMessage {
            message_type: MESSAGE_TYPE_ADAPTER_DATA,
            data_type: 9,
            data: vec![0x01],
            ..Default::default()
        };
        dispatcher.dispatch(&unknown_adapter).await.unwrap();

        let broadcast_echo = MeshMessage {
            message_type: MESSAGE_TYPE_SERIAL_CMD_BROADCAST,
            ..Default::default()
        };
        dispatcher.dispatch(&broadcast_echo).await.unwrap();

        assert_eq!(registry.count(), 0);
        assert!(sink.on_topic(TOPIC_MOTION_TRIGGER).is_empty());
        // Every message still produced an envelope record.
        assert_eq!(sink.on_topic(TOPIC_MESH_MESSAGES).len(), 3);
    }

    #[tokio::test]
    async fn test_outgoing_envelope_direction() {
        let (dispatcher, _, sink) = dispatcher();
        let msg = builder::build_health_request();

        dispatcher.log_envelope(&msg, "outgoing").await;

        let entries = sink.on_topic(TOPIC_MESH_MESSAGES);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["direction"], "outgoing");
    }
}
