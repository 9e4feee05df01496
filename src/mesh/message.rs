/// Wire unit exchanged with the gateway over the serial link.
///
/// Field tags must stay in sync with the gateway firmware's protobuf
/// definition; the firmware is the authority on the encoding.
#[derive(Clone, PartialEq, prost::Message)]
pub struct MeshMessage {
    #[prost(uint32, tag = "1")]
    pub message_type: u32,

    #[prost(int32, tag = "2")]
    pub data_type: i32,

    #[prost(bytes = "vec", tag = "3")]
    pub origin_mac: Vec<u8>,

    #[prost(bytes = "vec", tag = "4")]
    pub target_mac: Vec<u8>,

    #[prost(bytes = "vec", tag = "5")]
    pub last_hop_mac: Vec<u8>,

    #[prost(uint32, tag = "6")]
    pub hop_count: u32,

    /// Opaque adapter payload, at most 12 octets on the wire.
    #[prost(bytes = "vec", tag = "7")]
    pub data: Vec<u8>,
}
