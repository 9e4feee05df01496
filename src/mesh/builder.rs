use super::message::MeshMessage;
use super::{
    ADAPTER_TYPE_LED, ADAPTER_TYPE_PIR, ADAPTER_TYPE_SERIAL, ADAPTER_TYPE_UNKNOWN,
    ADAPTER_TYPE_WIFI, BROADCAST_MAC, MAC_LEN, MAX_DATA_LEN, MESSAGE_TYPE_ADAPTER_DATA,
    MESSAGE_TYPE_MASTER_BEACON, MESSAGE_TYPE_SERIAL_CMD_BROADCAST, OP_CONFIG_SET, OP_HEALTH_REPORT,
    OP_HEALTH_REQ,
};
use crate::errors::MeshError;

/// Parsed health report carried in a SERIAL payload with opcode 0xB1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub mac: Vec<u8>,
    pub adapter_type: i32,
    pub uptime: u32,
    pub hop_count: u32,
    pub origin_mac: Vec<u8>,
}

/// Builds a command setting the adapter type on a single node.
///
/// The all-ones address is valid and targets every node.
pub fn build_config_set(target_mac: &[u8], adapter_type: i32) -> Result<MeshMessage, MeshError> {
    if target_mac.len() != MAC_LEN {
        return Err(MeshError::InvalidMac(target_mac.len()));
    }

    let mut payload = vec![0u8; MAX_DATA_LEN];
    payload[0] = OP_CONFIG_SET;
    payload[1..7].copy_from_slice(target_mac);
    payload[7] = adapter_type as u8;
    // Bytes 8-11 are reserved, left zero.

    Ok(MeshMessage {
        message_type: MESSAGE_TYPE_ADAPTER_DATA,
        data_type: ADAPTER_TYPE_SERIAL,
        target_mac: target_mac.to_vec(),
        data: payload,
        ..Default::default()
    })
}

/// Builds a config-set command addressed to all nodes.
pub fn build_config_set_broadcast(adapter_type: i32) -> Result<MeshMessage, MeshError> {
    build_config_set(&BROADCAST_MAC, adapter_type)
}

/// Builds a health report solicitation; the gateway fans it out mesh-wide.
pub fn build_health_request() -> MeshMessage {
    let mut payload = vec![0u8; MAX_DATA_LEN];
    payload[0] = OP_HEALTH_REQ;

    MeshMessage {
        message_type: MESSAGE_TYPE_ADAPTER_DATA,
        data_type: ADAPTER_TYPE_SERIAL,
        data: payload,
        ..Default::default()
    }
}

/// Wraps `data` in a mesh-wide broadcast instruction to the gateway.
pub fn build_broadcast(data_type: i32, data: &[u8]) -> Result<MeshMessage, MeshError> {
    if data.len() > MAX_DATA_LEN {
        return Err(MeshError::OversizeData(data.len()));
    }

    let mut payload = vec![0u8; MAX_DATA_LEN];
    payload[..data.len()].copy_from_slice(data);

    Ok(MeshMessage {
        message_type: MESSAGE_TYPE_SERIAL_CMD_BROADCAST,
        data_type,
        data: payload,
        ..Default::default()
    })
}

/// Builds a targeted adapter data message.
pub fn build_adapter_data(
    target_mac: &[u8],
    data_type: i32,
    data: &[u8],
) -> Result<MeshMessage, MeshError> {
    if target_mac.len() != MAC_LEN {
        return Err(MeshError::InvalidMac(target_mac.len()));
    }
    if data.len() > MAX_DATA_LEN {
        return Err(MeshError::OversizeData(data.len()));
    }

    let mut payload = vec![0u8; MAX_DATA_LEN];
    payload[..data.len()].copy_from_slice(data);

    Ok(MeshMessage {
        message_type: MESSAGE_TYPE_ADAPTER_DATA,
        data_type,
        target_mac: target_mac.to_vec(),
        data: payload,
        ..Default::default()
    })
}

/// Extracts the health information from a health report message.
pub fn parse_health_report(msg: &MeshMessage) -> Result<HealthReport, MeshError> {
    if msg.data_type != ADAPTER_TYPE_SERIAL {
        return Err(MeshError::NotSerial);
    }
    if msg.data.len() < MAX_DATA_LEN {
        return Err(MeshError::ShortHealthReport(msg.data.len()));
    }
    if msg.data[0] != OP_HEALTH_REPORT {
        return Err(MeshError::WrongOpcode(msg.data[0]));
    }

    // Widen through i8 so 0xFF reports as UNKNOWN (-1).
    let adapter_type = i32::from(msg.data[1] as i8);
    let mac = msg.data[2..8].to_vec();
    let uptime = u32::from_le_bytes([msg.data[8], msg.data[9], msg.data[10], msg.data[11]]);

    Ok(HealthReport {
        mac,
        adapter_type,
        uptime,
        hop_count: msg.hop_count,
        origin_mac: msg.origin_mac.clone(),
    })
}

pub fn is_health_report(msg: &MeshMessage) -> bool {
    msg.data_type == ADAPTER_TYPE_SERIAL
        && !msg.data.is_empty()
        && msg.data[0] == OP_HEALTH_REPORT
}

pub fn is_master_beacon(msg: &MeshMessage) -> bool {
    msg.message_type == MESSAGE_TYPE_MASTER_BEACON
}

/// Human-readable name for an adapter type.
pub fn adapter_type_name(adapter_type: i32) -> String {
    match adapter_type {
        ADAPTER_TYPE_UNKNOWN => "Unknown".to_string(),
        ADAPTER_TYPE_PIR => "PIR".to_string(),
        ADAPTER_TYPE_WIFI => "WiFi".to_string(),
        ADAPTER_TYPE_LED => "LED".to_string(),
        ADAPTER_TYPE_SERIAL => "Serial".to_string(),
        other => format!("Unknown({other})"),
    }
}
