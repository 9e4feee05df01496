use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

use motionmesh_server::configs::settings::Mesh;
use motionmesh_server::create_app;
use motionmesh_server::mesh::codec::{FrameReader, FrameWriter};
use motionmesh_server::mesh::message::MeshMessage;
use motionmesh_server::mesh::supervisor::MeshSupervisor;
use motionmesh_server::services::event_sink::{EventSink, SinkError};

/// Event sink capturing every publish for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingSink {
    pub fn on_topic(&self, topic: &str) -> Vec<serde_json::Value> {
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

/// Supervisor attached to an in-memory duplex port; the test drives the
/// gateway end of the link.
pub struct MockApp {
    pub router: Router,
    pub supervisor: Arc<MeshSupervisor>,
    pub sink: Arc<RecordingSink>,
    gateway_reader: FrameReader<ReadHalf<DuplexStream>>,
    gateway_writer: WriteHalf<DuplexStream>,
}

impl MockApp {
    pub async fn new() -> Self {
        let (server_io, gateway_io) = tokio::io::duplex(4096);

        let sink = Arc::new(RecordingSink::default());
        let supervisor = Arc::new(MeshSupervisor::new(
            Mesh {
                port_path: String::from("/dev/null"),
                baud_rate: 115_200,
                health_timeout: 30,
            },
            Some(sink.clone()),
        ));

        supervisor.attach(server_io).await.unwrap();

        let (gateway_reader, gateway_writer) = tokio::io::split(gateway_io);

        Self {
            router: create_app(supervisor.clone()),
            supervisor,
            sink,
            gateway_reader: FrameReader::new(gateway_reader),
            gateway_writer,
        }
    }

    /// Injects a framed message as if the gateway had relayed it.
    pub async fn send_from_gateway(&mut self, msg: &MeshMessage) {
        FrameWriter::new(&mut self.gateway_writer)
            .write_frame(msg)
            .await
            .unwrap();
    }

    /// Injects raw, unframed bytes (desynchronized gateway output).
    pub async fn send_raw_from_gateway(&mut self, bytes: &[u8]) {
        use tokio::io::AsyncWriteExt;

        self.gateway_writer.write_all(bytes).await.unwrap();
    }

    /// Next frame the server wrote towards the gateway.
    pub async fn read_at_gateway(&mut self) -> MeshMessage {
        tokio::time::timeout(Duration::from_secs(2), self.gateway_reader.read_frame())
            .await
            .expect("no outbound frame within timeout")
            .unwrap()
    }

    /// Polls until `condition` holds; panics after two seconds.
    pub async fn wait_until<F>(&self, condition: F)
    where
        F: Fn() -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not met within timeout")
    }
}
