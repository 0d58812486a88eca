//! Fixed-layout RPC framing for co-processor links.
//!
//! Every message is an eight-word header followed by `parameter_size` bytes
//! of payload. Words travel in the co-processor's byte order and are
//! converted exactly once at the transport boundary; everything above this
//! crate sees native order only.

pub mod codec;
pub mod endian;
pub mod error;
pub mod rpc;

pub use codec::{
    words_to_bytes, FrameConfig, RpcFrame, RpcHeader, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
    PARAMETER_SIZE_OFFSET, WORD_SIZE,
};
pub use endian::{foreign_order, host_to_wire, peek_parameter_size, swap_words, wire_to_host};
pub use error::{FrameError, Result};
pub use rpc::{
    align_for_remote, align_rpc, align_up, program_name, remote_cpu_name, AUDIO_ID,
    DEFAULT_REPLY_TIMEOUT, HIFI1_ID, HIFI_BUFFER_ALIGN, HIFI_ID, KERNEL_ID, KR4_ID, REMOTE_ALLOC,
    REPLY_ID, RPC_AUDIO, RPC_HIFI, RPC_KR4, RPC_VIDEO, RPC_VIDEO2, S_OK, VE3_ID, VIDEO_ID,
};
