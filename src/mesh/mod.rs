pub mod builder;
pub mod codec;
pub mod dispatch;
pub mod message;
pub mod registry;
pub mod supervisor;

// Message types exchanged with the gateway node.
pub const MESSAGE_TYPE_ADAPTER_DATA: u32 = 0;
pub const MESSAGE_TYPE_MASTER_BEACON: u32 = 1;
pub const MESSAGE_TYPE_SERIAL_CMD_BROADCAST: u32 = 3;

// Adapter types (maps to the firmware enum).
pub const ADAPTER_TYPE_UNKNOWN: i32 = -1;
pub const ADAPTER_TYPE_PIR: i32 = 0;
pub const ADAPTER_TYPE_WIFI: i32 = 1; // reserved
pub const ADAPTER_TYPE_LED: i32 = 2; // reserved
pub const ADAPTER_TYPE_SERIAL: i32 = 3;

// Serial control opcodes, valid only when the data type is SERIAL.
pub const OP_CONFIG_SET: u8 = 0xA0;
pub const OP_HEALTH_REQ: u8 = 0xB0;
pub const OP_HEALTH_REPORT: u8 = 0xB1;

/// All-ones target address denotes a mesh-wide broadcast.
pub const BROADCAST_MAC: [u8; 6] = [0xFF; 6];

pub const MAC_LEN: usize = 6;
pub const MAX_DATA_LEN: usize = 12;
pub const MAX_FRAME_LEN: usize = 4096;
