//! Frame codec for the single-frame text subset of RFC 6455
//!
//! Server frames are always unmasked `FIN | text` frames. Client frames are
//! read as masked frames; the opcode and FIN bit are not inspected, so control
//! and continuation frames are decoded as if they were text.

use crate::error::{ChatError, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on a decoded payload unless configured otherwise
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

const FIN_TEXT: u8 = 0x81;
const MASK_BIT: u8 = 0x80;
const LEN_MASK: u8 = 0x7F;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;
const MAX_SHORT_LEN: usize = 125;

/// Encode `text` as an unmasked server-to-client text frame.
pub fn encode_text(text: &str) -> Vec<u8> {
    let payload = text.as_bytes();
    let mut frame = Vec::with_capacity(payload.len() + 10);
    frame.push(FIN_TEXT);
    push_length(&mut frame, payload.len(), 0);
    frame.extend_from_slice(payload);
    frame
}

/// Encode `text` as a masked client-to-server text frame.
///
/// The server never sends these. Benches and tests use it to play the
/// browser side of a connection.
pub fn encode_masked_text(text: &str, mask: [u8; 4]) -> Vec<u8> {
    let mut payload = text.as_bytes().to_vec();
    apply_mask(&mut payload, mask);

    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(FIN_TEXT);
    push_length(&mut frame, payload.len(), MASK_BIT);
    frame.extend_from_slice(&mask);
    frame.extend_from_slice(&payload);
    frame
}

fn push_length(frame: &mut Vec<u8>, len: usize, mask_bit: u8) {
    if len <= MAX_SHORT_LEN {
        frame.push(mask_bit | len as u8);
    } else if len <= usize::from(u16::MAX) {
        frame.push(mask_bit | LEN_16);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(mask_bit | LEN_64);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }
}

/// XOR byte `i` of `payload` with `mask[i % 4]`. Applying it twice restores the input.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Read one masked client frame and return its payload as text.
///
/// Returns `Ok(None)` when the peer closed the stream before sending any byte
/// of a new frame. A stream that ends mid-frame surfaces as an IO error.
pub async fn read_text<R>(reader: &mut R, max_payload: usize) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    let read = reader.read(&mut header).await?;
    if read == 0 {
        return Ok(None);
    }
    if read == 1 {
        reader.read_exact(&mut header[1..]).await?;
    }

    let declared = match header[1] & LEN_MASK {
        LEN_16 => u64::from(reader.read_u16().await?),
        LEN_64 => reader.read_u64().await?,
        short => u64::from(short),
    };
    let len = usize::try_from(declared)
        .ok()
        .filter(|len| *len <= max_payload)
        .ok_or_else(|| {
            ChatError::Frame(format!(
                "payload length {} exceeds limit of {} bytes",
                declared, max_payload
            ))
        })?;

    let mut mask = [0u8; 4];
    reader.read_exact(&mut mask).await?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    apply_mask(&mut payload, mask);

    String::from_utf8(payload)
        .map(Some)
        .map_err(|e| ChatError::Frame(format!("payload is not valid UTF-8: {}", e)))
}
