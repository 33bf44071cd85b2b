//! WebSocket frame codec (RFC 6455 subset).
//!
//! # Wire format
//!
//! ```text
//! byte 0: FIN(1) RSV(3) OPCODE(4)
//! byte 1: MASK(1) LEN(7)
//!   LEN <= 125  → payload length
//!   LEN == 126  → next 2 bytes, big-endian u16
//!   LEN == 127  → next 8 bytes, big-endian u64
//! [4 bytes mask key, if MASK]
//! payload
//! ```
//!
//! The server only ever writes single, final, unmasked text frames.
//! Fragmentation is not supported in either direction.

/// First byte of every frame we write: FIN + text opcode.
pub const TEXT_FRAME: u8 = 0x81;

/// Opcode of a close control frame.
pub const OPCODE_CLOSE: u8 = 0x8;

const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// A complete frame read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Any non-close frame, payload already unmasked.
    Data(Vec<u8>),
    /// Peer asked to close the connection.
    Close,
}

/// A frame header that can never become a valid frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// `frame_len` counts header, mask key and payload, so a reader can
    /// skip the rest of the frame.
    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    TooLarge { len: u64, max: usize, frame_len: u64 },

    #[error("64-bit frame length has its most significant bit set")]
    InvalidLength,
}

/// Encode `payload` as one final, unmasked text frame.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(len + 10);
    frame.push(TEXT_FRAME);

    if len <= 125 {
        frame.push(len as u8);
    } else if len <= u16::MAX as usize {
        frame.push(LEN_16);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(LEN_64);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    frame.extend_from_slice(payload);
    frame
}

/// Parse the first frame in `buf`.
///
/// Returns `Ok(None)` while the buffer holds less than one complete frame,
/// otherwise the frame and the number of bytes it occupied.
pub fn parse(buf: &[u8], max_payload: usize) -> Result<Option<(Frame, usize)>, FrameError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let opcode = buf[0] & 0x0F;
    let masked = buf[1] & 0x80 != 0;
    let mut offset = 2;

    let len = match buf[1] & 0x7F {
        LEN_16 => {
            let Some(bytes) = buf.get(offset..offset + 2) else {
                return Ok(None);
            };
            offset += 2;
            u16::from_be_bytes([bytes[0], bytes[1]]) as u64
        }
        LEN_64 => {
            let Some(bytes) = buf.get(offset..offset + 8) else {
                return Ok(None);
            };
            offset += 8;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            let len = u64::from_be_bytes(raw);
            if len & (1 << 63) != 0 {
                return Err(FrameError::InvalidLength);
            }
            len
        }
        short => short as u64,
    };

    if len > max_payload as u64 {
        let header = offset as u64 + if masked { 4 } else { 0 };
        return Err(FrameError::TooLarge {
            len,
            max: max_payload,
            frame_len: header + len,
        });
    }
    let len = len as usize;

    let mask = if masked {
        let Some(key) = buf.get(offset..offset + 4) else {
            return Ok(None);
        };
        offset += 4;
        Some([key[0], key[1], key[2], key[3]])
    } else {
        None
    };

    let Some(body) = buf.get(offset..offset + len) else {
        return Ok(None);
    };
    let consumed = offset + len;

    if opcode == OPCODE_CLOSE {
        return Ok(Some((Frame::Close, consumed)));
    }

    let payload = match mask {
        Some(key) => body
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % 4])
            .collect(),
        None => body.to_vec(),
    };

    Ok(Some((Frame::Data(payload), consumed)))
}

/// Decode a single frame that is expected to fill `buf` from the start.
///
/// Close frames, partial buffers and malformed headers all yield `None`.
pub fn decode(buf: &[u8]) -> Option<Vec<u8>> {
    match parse(buf, usize::MAX) {
        Ok(Some((Frame::Data(payload), _))) => Some(payload),
        _ => None,
    }
}
