use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::ApiError;
use crate::mesh::builder::adapter_type_name;
use crate::mesh::registry::parse_mac;
use crate::mesh::supervisor::MeshSupervisor;

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureBody {
    pub adapter_type: i32,
}

#[derive(Clone)]
pub struct NodeState {
    pub supervisor: Arc<MeshSupervisor>,
}

pub async fn get_nodes(State(state): State<NodeState>) -> impl IntoResponse {
    Json(state.supervisor.registry().get_all())
}

pub async fn get_node(
    Path(mac): Path<String>,
    State(state): State<NodeState>,
) -> Result<impl IntoResponse, ApiError> {
    let mac = parse_mac(&mac)?;

    let node = state
        .supervisor
        .registry()
        .get(&mac)
        .ok_or(ApiError::NodeNotFound)?;

    Ok(Json(node))
}

pub async fn configure_node(
    Path(mac): Path<String>,
    State(state): State<NodeState>,
    Json(body): Json<ConfigureBody>,
) -> Result<impl IntoResponse, ApiError> {
    let mac = parse_mac(&mac)?;

    state
        .supervisor
        .configure_node(&mac, body.adapter_type)
        .await?;

    Ok(Json(json!({
        "message": format!(
            "Node configured to adapter type {}",
            adapter_type_name(body.adapter_type)
        )
    })))
}

pub async fn configure_all_nodes(
    State(state): State<NodeState>,
    Json(body): Json<ConfigureBody>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .supervisor
        .configure_all_nodes(body.adapter_type)
        .await?;

    Ok(Json(json!({
        "message": format!(
            "All nodes configured to adapter type {}",
            adapter_type_name(body.adapter_type)
        )
    })))
}
