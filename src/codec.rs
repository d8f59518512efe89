//! Length-prefixed bincode framing for [`Envelope`]s.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload.

use anyhow::anyhow;

use crate::protocol::{Envelope, Message, PROTOCOL_VERSION};

/// Maximum payload size (1 MiB) to prevent excessive memory allocation.
pub const MAX_FRAME_SIZE: u32 = 1 << 20;

const HEADER_LEN: usize = 4;

/// Serialize `msg` into a complete frame.
pub fn encode_frame(msg: &Message) -> anyhow::Result<Vec<u8>> {
    let payload = bincode::serialize(&Envelope::new(msg.clone()))
        .map_err(|e| anyhow!("Serialization error: {}", e))?;
    if payload.len() as u64 > MAX_FRAME_SIZE as u64 {
        return Err(anyhow!(
            "Message too large: {} bytes (max: {})",
            payload.len(),
            MAX_FRAME_SIZE
        ));
    }
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a single payload (without its length prefix).
pub fn decode_payload(payload: &[u8]) -> anyhow::Result<Message> {
    let envelope: Envelope =
        bincode::deserialize(payload).map_err(|e| anyhow!("Deserialization error: {}", e))?;
    if envelope.version != PROTOCOL_VERSION {
        return Err(anyhow!(
            "Protocol version mismatch: expected {}, got {}",
            PROTOCOL_VERSION,
            envelope.version
        ));
    }
    Ok(envelope.message)
}

/// Pull the next complete frame out of `buf`, if one has fully arrived.
///
/// Consumed bytes are drained from the buffer; a partial frame is left in
/// place for the next call.
pub fn try_decode(buf: &mut Vec<u8>) -> anyhow::Result<Option<Message>> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if len == 0 {
        return Err(anyhow!("Invalid message length: 0"));
    }
    if len > MAX_FRAME_SIZE {
        return Err(anyhow!(
            "Message too large: {} bytes (max: {})",
            len,
            MAX_FRAME_SIZE
        ));
    }
    let end = HEADER_LEN + len as usize;
    if buf.len() < end {
        return Ok(None);
    }
    let msg = decode_payload(&buf[HEADER_LEN..end]);
    buf.drain(..end);
    msg.map(Some)
}
