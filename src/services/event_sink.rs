use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use tokio::sync::Mutex;

use crate::configs::settings::Gateway;

pub type SinkError = Box<dyn Error + Send + Sync>;

/// Minimal event-bus capability the mesh bridge publishes through.
///
/// Publishes are best-effort: the bridge logs and swallows failures, so an
/// absent or unhealthy bus never stalls mesh traffic.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn connect(&self) -> Result<(), SinkError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SinkError>;

    async fn subscribe(&self, topic: &str) -> Result<(), SinkError>;
}

/// MQTT-backed event sink.
pub struct MqttEventSink {
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
}

impl MqttEventSink {
    pub fn new(gateway: &Gateway) -> Self {
        let mut options = MqttOptions::new(&gateway.client_id, &gateway.host, gateway.port);
        options.set_keep_alive(Duration::from_secs(5));

        let (client, event_loop) = AsyncClient::new(options, 10);

        Self {
            client,
            event_loop: Mutex::new(Some(event_loop)),
        }
    }
}

#[async_trait]
impl EventSink for MqttEventSink {
    /// Starts the broker session by driving the event loop on its own task.
    /// Connection problems surface in that task's log stream and the client
    /// keeps retrying, so callers treat a spawned loop as connected.
    async fn connect(&self) -> Result<(), SinkError> {
        let Some(mut event_loop) = self.event_loop.lock().await.take() else {
            return Err("event bus already connected".into());
        };

        tokio::spawn(async move {
            loop {
                if let Err(e) = event_loop.poll().await {
                    tracing::error!("MQTT error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });

        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), SinkError> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;

        tracing::debug!("subscribed to topic {}", topic);

        Ok(())
    }
}
