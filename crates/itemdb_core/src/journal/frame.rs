//! Journal frame layout.
//!
//! ```text
//! | magic (4) | version (u16 LE) | length (u32 LE) | payload (CBOR) | crc32 (u32 LE) |
//! ```
//!
//! The checksum covers version, length and payload.

use crate::error::{CoreError, CoreResult};

/// Magic bytes opening every frame.
pub(crate) const MAGIC: [u8; 4] = *b"IDBJ";

/// Current frame format version.
pub(crate) const VERSION: u16 = 1;

/// Bytes before the payload.
pub(crate) const HEADER_LEN: usize = 4 + 2 + 4;

/// Bytes after the payload.
pub(crate) const TRAILER_LEN: usize = 4;

/// Wraps a payload in a frame.
pub(crate) fn encode(payload: &[u8]) -> CoreResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::codec(format!("record of {} bytes is too large", payload.len())))?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    let crc = compute_crc32(&frame[MAGIC.len()..]);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Result of looking at the bytes from some offset on.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decoded<'a> {
    /// A complete, valid frame and its total length.
    Frame { payload: &'a [u8], len: usize },
    /// The bytes end inside a frame.
    Torn,
}

/// Decodes the frame starting at `offset` of `data`.
pub(crate) fn decode(data: &[u8], offset: usize) -> CoreResult<Decoded<'_>> {
    let rest = &data[offset..];
    if rest.len() < HEADER_LEN {
        return Ok(Decoded::Torn);
    }
    if rest[..4] != MAGIC {
        return Err(CoreError::journal_corruption(offset as u64, "bad frame magic"));
    }
    let version = u16::from_le_bytes([rest[4], rest[5]]);
    if version != VERSION {
        return Err(CoreError::journal_corruption(
            offset as u64,
            format!("unsupported frame version {version}"),
        ));
    }
    let len = u32::from_le_bytes([rest[6], rest[7], rest[8], rest[9]]) as usize;
    let total = HEADER_LEN + len + TRAILER_LEN;
    if rest.len() < total {
        return Ok(Decoded::Torn);
    }
    let body_end = HEADER_LEN + len;
    let stored = u32::from_le_bytes([
        rest[body_end],
        rest[body_end + 1],
        rest[body_end + 2],
        rest[body_end + 3],
    ]);
    let actual = compute_crc32(&rest[MAGIC.len()..body_end]);
    if stored != actual {
        return Err(CoreError::ChecksumMismatch {
            expected: stored,
            actual,
        });
    }
    Ok(Decoded::Frame {
        payload: &rest[HEADER_LEN..body_end],
        len: total,
    })
}

/// Computes the IEEE CRC32 of `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}
