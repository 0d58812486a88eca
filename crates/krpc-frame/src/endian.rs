//! Word-order conversion at the transport boundary.
//!
//! Every 32-bit word of a frame, header and payload alike, travels in the
//! co-processor's byte order. Outbound buffers are swapped whole. Inbound
//! buffers are converted in two phases: the length word is read in wire
//! order first, then only `HEADER_SIZE + parameter_size` bytes are swapped.

use krpc_transport::ByteOrder;

use crate::codec::{HEADER_SIZE, PARAMETER_SIZE_OFFSET, WORD_SIZE};
use crate::error::{FrameError, Result};

/// Reverse the bytes of every 32-bit word in `buf`.
pub fn swap_words(buf: &mut [u8]) -> Result<()> {
    if buf.len() % WORD_SIZE != 0 {
        return Err(FrameError::Misaligned(buf.len()));
    }
    for word in buf.chunks_exact_mut(WORD_SIZE) {
        word.reverse();
    }
    Ok(())
}

/// Read the `parameter_size` word of a raw frame in wire order.
///
/// This is the first decode phase; nothing else in the buffer is trusted yet.
pub fn peek_parameter_size(raw: &[u8], remote: ByteOrder) -> Result<u32> {
    let end = PARAMETER_SIZE_OFFSET + WORD_SIZE;
    if raw.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            available: raw.len(),
        });
    }
    let mut word = [0u8; WORD_SIZE];
    word.copy_from_slice(&raw[PARAMETER_SIZE_OFFSET..end]);
    Ok(match remote {
        ByteOrder::Little => u32::from_le_bytes(word),
        ByteOrder::Big => u32::from_be_bytes(word),
    })
}

/// Convert an inbound frame to native order in place.
///
/// Returns the frame span (`HEADER_SIZE + parameter_size`). Bytes past the
/// span are left untouched.
pub fn wire_to_host(raw: &mut [u8], remote: ByteOrder) -> Result<usize> {
    let parameter_size = peek_parameter_size(raw, remote)?;
    let span = (parameter_size as usize).saturating_add(HEADER_SIZE);
    if span > raw.len() {
        return Err(FrameError::Truncated {
            needed: span,
            available: raw.len(),
        });
    }
    if remote.differs_from_native() {
        swap_words(&mut raw[..span])?;
    }
    Ok(span)
}

/// Convert an outbound buffer from native order to the remote's order.
pub fn host_to_wire(buf: &mut [u8], remote: ByteOrder) -> Result<()> {
    if remote.differs_from_native() {
        swap_words(buf)?;
    }
    Ok(())
}

/// The byte order that is not native.
pub fn foreign_order() -> ByteOrder {
    match ByteOrder::native() {
        ByteOrder::Little => ByteOrder::Big,
        ByteOrder::Big => ByteOrder::Little,
    }
}
