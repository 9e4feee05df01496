use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};
use tokio_util::sync::CancellationToken;

use super::builder::{self, adapter_type_name};
use super::codec::{FrameReader, FrameWriter};
use super::dispatch::Dispatcher;
use super::message::MeshMessage;
use super::registry::{format_mac, NodeRegistry};
use crate::configs::settings::Mesh;
use crate::errors::MeshError;
use crate::services::event_sink::EventSink;

const MAX_CONSECUTIVE_ERRORS: u32 = 10;
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

type BoxedReader = FrameReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = FrameWriter<Box<dyn AsyncWrite + Send + Unpin>>;

enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

struct Runtime {
    state: Lifecycle,
    cancel: Option<CancellationToken>,
    reader: Option<JoinHandle<()>>,
}

/// Owns the serial link to the mesh gateway.
///
/// The supervisor runs exactly one background reader while running; outbound
/// frames from concurrent control-plane calls are serialized by the writer
/// lock so they never interleave on the wire. The lifecycle is one-shot: a
/// stopped supervisor refuses to start again.
pub struct MeshSupervisor {
    config: Mesh,
    registry: Arc<NodeRegistry>,
    dispatcher: Dispatcher,
    running: AtomicBool,
    runtime: Mutex<Runtime>,
    writer: Mutex<Option<BoxedWriter>>,
}

impl MeshSupervisor {
    pub fn new(config: Mesh, sink: Option<Arc<dyn EventSink>>) -> Self {
        let registry = Arc::new(NodeRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone(), sink);

        Self {
            config,
            registry,
            dispatcher,
            running: AtomicBool::new(false),
            runtime: Mutex::new(Runtime {
                state: Lifecycle::Idle,
                cancel: None,
                reader: None,
            }),
            writer: Mutex::new(None),
        }
    }

    /// Opens the configured serial port (8-N-1) and starts the read loop.
    /// A port-open failure leaves the supervisor idle.
    pub async fn start(&self) -> Result<(), MeshError> {
        let mut runtime = self.runtime.lock().await;
        check_startable(&runtime)?;

        let port = tokio_serial::new(self.config.port_path.as_str(), self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(|source| MeshError::PortOpen {
                path: self.config.port_path.clone(),
                source,
            })?;

        self.launch(&mut runtime, port).await;

        tracing::info!(
            "mesh supervisor started on {} at {} baud",
            self.config.port_path,
            self.config.baud_rate,
        );

        Ok(())
    }

    /// Starts the read loop over an already-open byte stream instead of the
    /// configured serial port.
    pub async fn attach<IO>(&self, stream: IO) -> Result<(), MeshError>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut runtime = self.runtime.lock().await;
        check_startable(&runtime)?;

        self.launch(&mut runtime, stream).await;

        Ok(())
    }

    async fn launch<IO>(&self, runtime: &mut Runtime, stream: IO)
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let cancel = CancellationToken::new();

        let boxed_write: Box<dyn AsyncWrite + Send + Unpin> = Box::new(write_half);
        *self.writer.lock().await = Some(FrameWriter::new(boxed_write));

        let boxed_read: Box<dyn AsyncRead + Send + Unpin> = Box::new(read_half);
        let reader = FrameReader::new(boxed_read);
        let handle = tokio::spawn(read_loop(reader, self.dispatcher.clone(), cancel.clone()));

        runtime.state = Lifecycle::Running;
        runtime.cancel = Some(cancel);
        runtime.reader = Some(handle);
        self.running.store(true, Ordering::SeqCst);
    }

    /// Cancels the reader, closes the port and joins the reader task.
    pub async fn stop(&self) -> Result<(), MeshError> {
        let (cancel, reader) = {
            let mut runtime = self.runtime.lock().await;
            if !matches!(runtime.state, Lifecycle::Running) {
                return Err(MeshError::NotRunning);
            }

            runtime.state = Lifecycle::Stopped;
            self.running.store(false, Ordering::SeqCst);
            (runtime.cancel.take(), runtime.reader.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        // Dropping the writer closes the write half of the port.
        *self.writer.lock().await = None;

        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                tracing::warn!("mesh reader task failed: {}", e);
            }
        }

        tracing::info!("mesh supervisor stopped");

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Window after which a node without a fresh health report counts offline.
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.config.health_timeout)
    }

    /// Logs the outbound envelope to the bus (best-effort) and writes the
    /// frame to the gateway.
    pub async fn send_message(&self, msg: MeshMessage) -> Result<(), MeshError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(MeshError::NotRunning)?;

        self.dispatcher.log_envelope(&msg, "outgoing").await;

        writer.write_frame(&msg).await
    }

    /// Sets the adapter type on a single node.
    pub async fn configure_node(
        &self,
        target_mac: &[u8],
        adapter_type: i32,
    ) -> Result<(), MeshError> {
        let msg = builder::build_config_set(target_mac, adapter_type)?;

        tracing::info!(
            "configuring node {} to adapter type {}",
            format_mac(target_mac),
            adapter_type_name(adapter_type),
        );

        self.send_message(msg).await
    }

    /// Sets the adapter type on every node via the broadcast address.
    pub async fn configure_all_nodes(&self, adapter_type: i32) -> Result<(), MeshError> {
        let msg = builder::build_config_set_broadcast(adapter_type)?;

        tracing::info!(
            "configuring all nodes to adapter type {}",
            adapter_type_name(adapter_type),
        );

        self.send_message(msg).await
    }

    /// Fire-and-forget solicitation; responses arrive through the read loop.
    pub async fn request_health_reports(&self) -> Result<(), MeshError> {
        tracing::info!("requesting health reports from all nodes");

        self.send_message(builder::build_health_request()).await
    }

    /// Broadcasts an opaque payload mesh-wide.
    pub async fn broadcast_data(&self, data_type: i32, data: &[u8]) -> Result<(), MeshError> {
        let msg = builder::build_broadcast(data_type, data)?;

        tracing::info!(
            "broadcasting data: type={} length={}",
            adapter_type_name(data_type),
            data.len(),
        );

        self.send_message(msg).await
    }
}

fn check_startable(runtime: &Runtime) -> Result<(), MeshError> {
    match runtime.state {
        Lifecycle::Idle => Ok(()),
        Lifecycle::Running => Err(MeshError::AlreadyRunning),
        Lifecycle::Stopped => Err(MeshError::Stopped),
    }
}

/// Single reader: survives any sequence of decode and I/O errors, backing
/// off 100 ms per failure so an absent or desynchronized gateway cannot spin
/// the loop. Only the first ten consecutive errors are reported verbosely.
async fn read_loop(mut reader: BoxedReader, dispatcher: Dispatcher, cancel: CancellationToken) {
    let mut consecutive_errors: u32 = 0;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = reader.read_frame() => result,
        };

        match result {
            Ok(msg) => {
                if consecutive_errors > MAX_CONSECUTIVE_ERRORS {
                    tracing::info!(
                        "frame reading recovered after {} consecutive errors",
                        consecutive_errors,
                    );
                }
                consecutive_errors = 0;

                if let Err(e) = dispatcher.dispatch(&msg).await {
                    tracing::warn!("error handling message: {}", e);
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors <= MAX_CONSECUTIVE_ERRORS {
                    tracing::warn!("error reading frame: {}", e);
                } else if consecutive_errors == MAX_CONSECUTIVE_ERRORS + 1 {
                    tracing::warn!(
                        "too many consecutive frame errors, suppressing further reports; last error: {}",
                        e,
                    );
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(READ_ERROR_BACKOFF) => {}
                }
            }
        }
    }
}
