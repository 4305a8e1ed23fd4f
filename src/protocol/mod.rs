//! Protocol module - chunked transport framing.
//!
//! Adapts arbitrarily sized serialized envelopes to a transport with a
//! fixed maximum notification size:
//! - 4-byte `{index, total}` frame header encoding/decoding
//! - [`split`] for producing MTU-bounded frames
//! - [`Reassembler`] for accumulating frames back into an envelope

mod frame;
mod reassembly;

pub use frame::{split, FrameHeader, DEFAULT_MTU, FRAME_HEADER_SIZE};
pub use reassembly::{Reassembler, DEFAULT_MAX_REASSEMBLY_SIZE};
