use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::MAC_LEN;
use crate::errors::MeshError;

/// State of one known mesh node, refreshed by health reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub mac: Vec<u8>,
    pub mac_string: String,
    pub adapter_type: i32,
    pub uptime: u32,
    pub last_seen: OffsetDateTime,
    pub hop_count: u32,
}

/// Concurrent map of known mesh nodes, keyed by canonical MAC string.
///
/// The registry owns its entries; every accessor hands out owned copies so
/// callers never alias the registry's backing storage. The lock is never
/// held across I/O.
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, NodeInfo>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Upserts a node from a health report, refreshing its freshness stamp.
    pub fn update(&self, mac: &[u8], adapter_type: i32, uptime: u32, hop_count: u32) {
        let mac_string = format_mac(mac);
        let mut nodes = self.nodes.write();

        let node = nodes.entry(mac_string.clone()).or_insert_with(|| NodeInfo {
            mac: mac.to_vec(),
            mac_string,
            adapter_type,
            uptime,
            last_seen: OffsetDateTime::now_utc(),
            hop_count,
        });

        node.adapter_type = adapter_type;
        node.uptime = uptime;
        node.hop_count = hop_count;
        node.last_seen = OffsetDateTime::now_utc();
    }

    pub fn get(&self, mac: &[u8]) -> Option<NodeInfo> {
        self.nodes.read().get(&format_mac(mac)).cloned()
    }

    /// Snapshot of every known node, unordered.
    pub fn get_all(&self) -> Vec<NodeInfo> {
        self.nodes.read().values().cloned().collect()
    }

    /// Nodes whose last health report is strictly within `timeout` of now.
    pub fn get_online(&self, timeout: Duration) -> Vec<NodeInfo> {
        let cutoff = OffsetDateTime::now_utc() - timeout;

        self.nodes
            .read()
            .values()
            .filter(|node| node.last_seen > cutoff)
            .cloned()
            .collect()
    }

    pub fn remove(&self, mac: &[u8]) -> bool {
        self.nodes.write().remove(&format_mac(mac)).is_some()
    }

    pub fn count(&self) -> usize {
        self.nodes.read().len()
    }
}

/// Canonical lowercase `aa:bb:cc:dd:ee:ff` form; plain hex for input that is
/// not a 6-octet address.
pub fn format_mac(mac: &[u8]) -> String {
    let mut out = String::with_capacity(mac.len() * 3);

    for (i, byte) in mac.iter().enumerate() {
        if i > 0 && mac.len() == MAC_LEN {
            out.push(':');
        }
        let _ = write!(out, "{byte:02x}");
    }

    out
}

/// Parses a MAC address from either 12 bare hex digits or six two-digit hex
/// groups separated by `:`, case-insensitive.
pub fn parse_mac(input: &str) -> Result<[u8; MAC_LEN], MeshError> {
    let compact: String = if input.contains(':') {
        let groups: Vec<&str> = input.split(':').collect();
        if groups.len() != MAC_LEN || groups.iter().any(|group| group.len() != 2) {
            return Err(MeshError::InvalidMacFormat(input.to_string()));
        }
        groups.concat()
    } else {
        input.to_string()
    };

    if compact.len() != MAC_LEN * 2 || !compact.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(MeshError::InvalidMacFormat(input.to_string()));
    }

    let mut mac = [0u8; MAC_LEN];
    for (i, chunk) in compact.as_bytes().chunks(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16);
        let lo = (chunk[1] as char).to_digit(16);
        match (hi, lo) {
            (Some(hi), Some(lo)) => mac[i] = (hi * 16 + lo) as u8,
            _ => return Err(MeshError::InvalidMacFormat(input.to_string())),
        }
    }

    Ok(mac)
}
