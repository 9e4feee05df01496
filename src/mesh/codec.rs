use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::message::MeshMessage;
use super::MAX_FRAME_LEN;
use crate::errors::MeshError;

/// Upper bound on the resynchronization drain after an oversize header.
const RESYNC_DRAIN_LEN: usize = 100;

/// Reads length-prefixed mesh frames from an octet stream.
///
/// Frame layout: a 2-octet little-endian length followed by that many octets
/// of protobuf-encoded [`MeshMessage`].
pub struct FrameReader<R> {
    inner: R,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub async fn read_frame(&mut self) -> Result<MeshMessage, MeshError> {
        let mut header = [0u8; 2];
        self.inner.read_exact(&mut header).await?;

        let length = u16::from_le_bytes(header) as usize;
        if length == 0 {
            tracing::warn!("zero-length frame, possible frame sync issue");
            return Err(MeshError::ZeroLengthFrame);
        }

        if length > MAX_FRAME_LEN {
            // An implausible length usually means the gateway booted into a
            // diagnostic mode and is emitting ASCII instead of framed binary.
            tracing::warn!(
                "frame length {} too large (header {:02x} {:02x} {:?}), gateway may be sending text output",
                length,
                header[0],
                header[1],
                header.map(|b| if b.is_ascii_graphic() { b as char } else { '.' }),
            );
            let mut discard = [0u8; RESYNC_DRAIN_LEN];
            if let Ok(n) = self.inner.read(&mut discard).await {
                tracing::debug!("discarded {} bytes to realign on the next frame boundary", n);
            }
            return Err(MeshError::OversizeFrame(length));
        }

        let mut payload = vec![0u8; length];
        self.inner.read_exact(&mut payload).await?;

        Ok(MeshMessage::decode(payload.as_slice())?)
    }
}

/// Writes length-prefixed mesh frames to an octet stream.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Emits the 2-octet header then the payload; the caller sees no partial
    /// writes, only completion or an I/O error.
    pub async fn write_frame(&mut self, msg: &MeshMessage) -> Result<(), MeshError> {
        let payload = msg.encode_to_vec();
        if payload.len() > MAX_FRAME_LEN {
            return Err(MeshError::OversizeFrame(payload.len()));
        }

        let header = (payload.len() as u16).to_le_bytes();
        self.inner.write_all(&header).await?;
        self.inner.write_all(&payload).await?;
        self.inner.flush().await?;

        tracing::trace!(
            "wrote frame: type={} data_type={} len={}",
            msg.message_type,
            msg.data_type,
            payload.len(),
        );

        Ok(())
    }
}
