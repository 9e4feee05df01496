use super::MeshError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Mesh error: {0}")]
    MeshError(#[from] MeshError),

    #[error("Node not found")]
    NodeNotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}
