use axum::http::StatusCode;

use crate::mesh::{MAC_LEN, MAX_DATA_LEN, MAX_FRAME_LEN};

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("failed to open serial port {path}: {source}")]
    PortOpen {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid frame length: 0")]
    ZeroLengthFrame,

    #[error("frame length {0} exceeds maximum {}", MAX_FRAME_LEN)]
    OversizeFrame(usize),

    #[error("failed to decode frame: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("invalid MAC address length: {0}, expected {}", MAC_LEN)]
    InvalidMac(usize),

    #[error("invalid MAC address format: {0}")]
    InvalidMacFormat(String),

    #[error("data length {0} exceeds maximum {}", MAX_DATA_LEN)]
    OversizeData(usize),

    #[error("message is not a serial message")]
    NotSerial,

    #[error("insufficient data length for health report: {0}")]
    ShortHealthReport(usize),

    #[error("message is not a health report, opcode: {0:#04x}")]
    WrongOpcode(u8),

    #[error("mesh supervisor is already running")]
    AlreadyRunning,

    #[error("mesh supervisor is not running")]
    NotRunning,

    #[error("mesh supervisor has been shut down")]
    Stopped,
}

impl MeshError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MeshError::InvalidMac(_)
            | MeshError::InvalidMacFormat(_)
            | MeshError::OversizeData(_)
            | MeshError::NotSerial
            | MeshError::ShortHealthReport(_)
            | MeshError::WrongOpcode(_) => StatusCode::BAD_REQUEST,
            MeshError::AlreadyRunning | MeshError::NotRunning | MeshError::Stopped => {
                StatusCode::CONFLICT
            }
            MeshError::PortOpen { .. }
            | MeshError::Io(_)
            | MeshError::ZeroLengthFrame
            | MeshError::OversizeFrame(_)
            | MeshError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
