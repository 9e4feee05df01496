use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::configs::settings::Settings;
use crate::handles::mesh_handle::{
    broadcast_data, get_status, request_health, start_server, stop_server, MeshState,
};
use crate::handles::node_handle::{
    configure_all_nodes, configure_node, get_node, get_nodes, NodeState,
};
use crate::mesh::supervisor::MeshSupervisor;
use crate::services::event_sink::{EventSink, MqttEventSink};

pub mod configs;
pub mod errors;
pub mod handles;
pub mod mesh;
pub mod services;

pub async fn run(settings: &Arc<Settings>) {
    let sink = connect_event_sink(settings).await;

    let supervisor = Arc::new(MeshSupervisor::new(settings.mesh.clone(), sink));

    if let Err(e) = supervisor.start().await {
        tracing::warn!("failed to start mesh supervisor: {}, mesh bridge disabled", e);
    }

    spawn_health_poller(supervisor.clone());

    let app = create_app(supervisor);

    let ip_addr = settings.server.host.parse::<IpAddr>().unwrap();

    let address = SocketAddr::from((ip_addr, settings.server.port));

    let listener = TcpListener::bind(&address).await.unwrap();

    tracing::info!("listening on {:?}", address);

    axum::serve(listener, app).await.unwrap();
}

pub fn create_app(supervisor: Arc<MeshSupervisor>) -> Router {
    let nodes = Router::new()
        .route("/", get(get_nodes))
        .route("/configure-all", post(configure_all_nodes))
        .route("/:mac", get(get_node))
        .route("/:mac/configure", post(configure_node))
        .with_state(NodeState {
            supervisor: supervisor.clone(),
        });

    let mesh = Router::new()
        .route("/health/request", post(request_health))
        .route("/status", get(get_status))
        .route("/broadcast", post(broadcast_data))
        .route("/server/start", post(start_server))
        .route("/server/stop", post(stop_server))
        .with_state(MeshState { supervisor });

    Router::new()
        .nest("/nodes", nodes)
        .merge(mesh)
        .layer(CorsLayer::permissive())
}

async fn connect_event_sink(settings: &Arc<Settings>) -> Option<Arc<dyn EventSink>> {
    let sink = Arc::new(MqttEventSink::new(&settings.gateway));

    match sink.connect().await {
        Ok(()) => {
            tracing::info!(
                "event bus session started for {}:{}",
                settings.gateway.host,
                settings.gateway.port,
            );
            Some(sink)
        }
        Err(e) => {
            tracing::warn!("failed to connect event bus: {}, continuing without it", e);
            None
        }
    }
}

/// Solicits health reports shortly after boot, then at half the online
/// window so reachable nodes never fall out of the online set between polls.
fn spawn_health_poller(supervisor: Arc<MeshSupervisor>) {
    let interval = supervisor.health_timeout().div_f32(2.0).max(Duration::from_secs(1));

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;

        loop {
            if supervisor.is_running() {
                if let Err(e) = supervisor.request_health_reports().await {
                    tracing::debug!("health report solicitation failed: {}", e);
                }
            }

            tokio::time::sleep(interval).await;
        }
    });
}
