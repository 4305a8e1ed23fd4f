//! Frame header and envelope splitting.
//!
//! Every notification frame starts with a 4-byte header:
//!
//! ```text
//! ┌──────────┬──────────┬───────────────────┐
//! │ Index    │ Total    │ Payload slice     │
//! │ 2 bytes  │ 2 bytes  │ up to mtu-4 bytes │
//! │ uint16 BE│ uint16 BE│                   │
//! └──────────┴──────────┴───────────────────┘
//! ```
//!
//! The header is the only reassembly signal: chunk boundaries are never
//! inferred from payload content, since an MTU-sized slice can cut through
//! multi-byte encoded characters or JSON delimiters. A single-frame
//! envelope still carries the header (`index=0, total=1`).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BridgeError, Result};

/// Frame header size in bytes (fixed, exactly 4).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default maximum notification size in bytes, header included.
pub const DEFAULT_MTU: usize = 512;

/// Position of one frame within an envelope's frame sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Zero-based index of this frame.
    pub index: u16,
    /// Total number of frames for the envelope (at least 1).
    pub total: u16,
}

impl FrameHeader {
    /// Create a new frame header.
    pub fn new(index: u16, total: u16) -> Self {
        Self { index, total }
    }

    /// Encode the header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.index.to_be_bytes());
        buf[2..4].copy_from_slice(&self.total.to_be_bytes());
        buf
    }

    /// Decode a header from the start of a frame.
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        Some(Self {
            index: u16::from_be_bytes([buf[0], buf[1]]),
            total: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }

    /// Check if this frame closes its sequence.
    #[inline]
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }
}

/// Split a serialized envelope into MTU-bounded frames.
///
/// Produces `ceil(len / (mtu - 4))` frames, each prefixed with its
/// `{index, total}` header. Frames must be delivered to the peer strictly
/// in index order.
///
/// # Errors
///
/// Returns [`BridgeError::Framing`] if the MTU leaves no room for payload
/// or the envelope would need more than `u16::MAX` frames.
pub fn split(bytes: &[u8], mtu: usize) -> Result<Vec<Bytes>> {
    let per_frame = mtu.saturating_sub(FRAME_HEADER_SIZE);
    if per_frame == 0 {
        return Err(BridgeError::Framing(format!(
            "MTU {} leaves no room for payload (header is {} bytes)",
            mtu, FRAME_HEADER_SIZE
        )));
    }

    let total = bytes.len().div_ceil(per_frame).max(1);
    if total > u16::MAX as usize {
        return Err(BridgeError::Framing(format!(
            "Envelope of {} bytes needs {} frames, more than the {} limit",
            bytes.len(),
            total,
            u16::MAX
        )));
    }

    let mut frames = Vec::with_capacity(total);
    for (index, chunk) in chunks_or_empty(bytes, per_frame).enumerate() {
        let header = FrameHeader::new(index as u16, total as u16);
        let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + chunk.len());
        frame.put_slice(&header.encode());
        frame.put_slice(chunk);
        frames.push(frame.freeze());
    }

    Ok(frames)
}

/// Like `chunks`, but yields one empty chunk for empty input so that even
/// a zero-length envelope produces a frame.
fn chunks_or_empty<'a>(bytes: &'a [u8], size: usize) -> Box<dyn Iterator<Item = &'a [u8]> + 'a> {
    if bytes.is_empty() {
        Box::new(std::iter::once(&bytes[..]))
    } else {
        Box::new(bytes.chunks(size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = FrameHeader::new(3, 7);
        let decoded = FrameHeader::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = FrameHeader::new(0x0102, 0x0304);
        let bytes = header.encode();
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(FrameHeader::decode(&[0u8; 3]).is_none());
    }

    #[test]
    fn test_is_last() {
        assert!(FrameHeader::new(0, 1).is_last());
        assert!(FrameHeader::new(6, 7).is_last());
        assert!(!FrameHeader::new(0, 2).is_last());
    }

    #[test]
    fn test_split_single_frame() {
        let frames = split(b"hello", 512).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            FrameHeader::decode(&frames[0]).unwrap(),
            FrameHeader::new(0, 1)
        );
        assert_eq!(&frames[0][FRAME_HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_split_exact_fit() {
        // Payload exactly fills one frame's capacity.
        let payload = vec![0xAB; 512 - FRAME_HEADER_SIZE];
        let frames = split(&payload, 512).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_split_frame_count() {
        // 1000 bytes, 96 bytes of payload per frame -> ceil(1000/96) = 11.
        let payload = vec![7u8; 1000];
        let frames = split(&payload, 100).unwrap();
        assert_eq!(frames.len(), 11);

        for (i, frame) in frames.iter().enumerate() {
            let header = FrameHeader::decode(frame).unwrap();
            assert_eq!(header.index as usize, i);
            assert_eq!(header.total, 11);
            assert!(frame.len() <= 100);
        }
    }

    #[test]
    fn test_split_preserves_bytes_in_order() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        let frames = split(&payload, 128).unwrap();

        let mut rebuilt = Vec::new();
        for frame in &frames {
            rebuilt.extend_from_slice(&frame[FRAME_HEADER_SIZE..]);
        }
        assert_eq!(rebuilt, payload);
    }

    #[test]
    fn test_split_empty_payload() {
        let frames = split(b"", 512).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), FRAME_HEADER_SIZE);
    }

    #[test]
    fn test_split_mtu_too_small() {
        let result = split(b"data", FRAME_HEADER_SIZE);
        assert!(matches!(result, Err(BridgeError::Framing(_))));
    }

    #[test]
    fn test_split_too_many_frames() {
        // 5 would leave 1 payload byte per frame; 70000 bytes > u16::MAX frames.
        let payload = vec![0u8; 70_000];
        let result = split(&payload, FRAME_HEADER_SIZE + 1);
        assert!(matches!(result, Err(BridgeError::Framing(_))));
    }
}
