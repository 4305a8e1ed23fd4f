//! Reassembly of framed envelopes.
//!
//! One [`Reassembler`] accumulates the frames of a single in-flight
//! envelope per peer per direction. A peer may have at most one partially
//! received envelope at a time: a first frame arriving while a prior
//! envelope is incomplete is a framing error, as is any frame that does
//! not extend the open sequence. On error all partial state is dropped, so
//! a broken sequence can never be silently merged with a later envelope.

use bytes::{Bytes, BytesMut};

use super::frame::{FrameHeader, FRAME_HEADER_SIZE};
use crate::error::{BridgeError, Result};

/// Default cap on a reassembled envelope (1 MiB).
pub const DEFAULT_MAX_REASSEMBLY_SIZE: usize = 1024 * 1024;

/// Accumulates frames for one in-flight envelope.
#[derive(Debug)]
pub struct Reassembler {
    /// Payload bytes collected so far.
    buffer: BytesMut,
    /// Index expected from the next frame.
    next_index: u16,
    /// Total announced by the first frame of the open sequence.
    total: u16,
    /// Whether a sequence is currently open.
    active: bool,
    /// Maximum allowed reassembled size.
    max_size: usize,
}

impl Reassembler {
    /// Create a reassembler with the default size cap.
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_REASSEMBLY_SIZE)
    }

    /// Create a reassembler with a custom size cap.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            next_index: 0,
            total: 0,
            active: false,
            max_size,
        }
    }

    /// Feed one raw frame.
    ///
    /// Returns `Ok(Some(bytes))` when the frame completes an envelope,
    /// `Ok(None)` when more frames are expected.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Framing`] on a frame with an unexpected
    /// index, a first frame overlapping an incomplete envelope, a missing
    /// header, or a sequence exceeding the size cap. Any partial state is
    /// discarded before returning the error.
    pub fn push(&mut self, frame: &[u8]) -> Result<Option<Bytes>> {
        let header = match FrameHeader::decode(frame) {
            Some(h) => h,
            None => {
                self.clear();
                return Err(BridgeError::Framing(format!(
                    "Frame of {} bytes is shorter than the {}-byte header",
                    frame.len(),
                    FRAME_HEADER_SIZE
                )));
            }
        };
        let payload = &frame[FRAME_HEADER_SIZE..];

        if header.total == 0 {
            self.clear();
            return Err(BridgeError::Framing("Frame announces zero total frames".to_string()));
        }

        if header.index == 0 {
            if self.active {
                self.clear();
                return Err(BridgeError::Framing(
                    "New envelope started while a prior one is incomplete".to_string(),
                ));
            }
            if header.total == 1 {
                // Whole envelope in one frame, nothing to accumulate.
                return Ok(Some(Bytes::copy_from_slice(payload)));
            }
            self.active = true;
            self.total = header.total;
            self.next_index = 1;
            self.buffer.extend_from_slice(payload);
            return Ok(None);
        }

        if !self.active {
            self.clear();
            return Err(BridgeError::Framing(format!(
                "Continuation frame {} received with no envelope open",
                header.index
            )));
        }

        if header.index != self.next_index || header.total != self.total {
            let expected = self.next_index;
            self.clear();
            return Err(BridgeError::Framing(format!(
                "Expected frame {}, got {}/{}",
                expected, header.index, header.total
            )));
        }

        if self.buffer.len() + payload.len() > self.max_size {
            self.clear();
            return Err(BridgeError::Framing(format!(
                "Reassembled envelope exceeds {} byte limit",
                self.max_size
            )));
        }

        self.buffer.extend_from_slice(payload);
        self.next_index += 1;

        if header.is_last() {
            let complete = self.buffer.split().freeze();
            self.clear();
            return Ok(Some(complete));
        }

        Ok(None)
    }

    /// Check whether no envelope is currently open.
    #[inline]
    pub fn is_idle(&self) -> bool {
        !self.active
    }

    /// Drop any partial state and reset for a fresh sequence.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.next_index = 0;
        self.total = 0;
        self.active = false;
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
