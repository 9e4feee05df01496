use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::errors::ApiError;
use crate::mesh::supervisor::MeshSupervisor;

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastBody {
    pub data_type: i32,
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct MeshState {
    pub supervisor: Arc<MeshSupervisor>,
}

pub async fn request_health(
    State(state): State<MeshState>,
) -> Result<impl IntoResponse, ApiError> {
    state.supervisor.request_health_reports().await?;

    Ok(Json(json!({ "message": "Health reports requested" })))
}

pub async fn get_status(State(state): State<MeshState>) -> impl IntoResponse {
    let registry = state.supervisor.registry();
    let online = registry.get_online(state.supervisor.health_timeout());

    Json(json!({
        "running": state.supervisor.is_running(),
        "totalNodes": registry.count(),
        "onlineNodes": online.len(),
        "timestamp": OffsetDateTime::now_utc().unix_timestamp(),
    }))
}

pub async fn broadcast_data(
    State(state): State<MeshState>,
    Json(body): Json<BroadcastBody>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .supervisor
        .broadcast_data(body.data_type, &body.data)
        .await?;

    Ok(Json(json!({
        "message": format!("Data broadcast to all nodes (length: {})", body.data.len())
    })))
}

pub async fn start_server(State(state): State<MeshState>) -> Result<impl IntoResponse, ApiError> {
    state.supervisor.start().await?;

    Ok(Json(json!({ "message": "Mesh server started" })))
}

pub async fn stop_server(State(state): State<MeshState>) -> Result<impl IntoResponse, ApiError> {
    state.supervisor.stop().await?;

    Ok(Json(json!({ "message": "Mesh server stopped" })))
}
