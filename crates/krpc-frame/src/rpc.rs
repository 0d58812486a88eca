//! Protocol constants shared with the co-processor firmware.

use std::time::Duration;

/// `program_id` of a reply frame.
pub const REPLY_ID: u32 = 99;

/// `program_id`/`version_id` of a kernel-originated request.
pub const KERNEL_ID: u32 = 98;

/// Success return code carried in reply payloads.
pub const S_OK: u32 = 0x1000_0000;

/// Buffer address placeholder asking the remote to allocate.
pub const REMOTE_ALLOC: u32 = 0xffff_ffff;

/// Service slots a consumer can reference by index.
pub const RPC_AUDIO: u32 = 0x0;
pub const RPC_VIDEO: u32 = 0x1;
pub const RPC_VIDEO2: u32 = 0x2;
pub const RPC_HIFI: u32 = 0x3;
pub const RPC_KR4: u32 = 0x4;

/// Remote CPU identifiers.
pub const AUDIO_ID: u32 = 0x1;
pub const VIDEO_ID: u32 = 0x2;
pub const VE3_ID: u32 = 0x3;
pub const HIFI_ID: u32 = 0x4;
pub const HIFI1_ID: u32 = 0x5;
pub const KR4_ID: u32 = 0x6;

/// How long a synchronous call waits for its reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffer alignment the HiFi DSPs require.
pub const HIFI_BUFFER_ALIGN: u32 = 128;

/// Round `offset` up to the next 4-byte boundary.
pub fn align_rpc(offset: u32) -> u32 {
    align_up(offset, 4)
}

/// Round `value` up to a multiple of `align` (a power of two).
pub fn align_up(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    value.wrapping_add(mask) & !mask
}

/// Buffer size alignment for a given remote CPU.
pub fn align_for_remote(size: u32, remote_cpu: u32) -> u32 {
    match remote_cpu {
        HIFI_ID | HIFI1_ID => align_up(align_rpc(size), HIFI_BUFFER_ALIGN),
        _ => align_rpc(size),
    }
}

/// Returns a human-readable name for a `program_id`.
pub fn program_name(program_id: u32) -> &'static str {
    match program_id {
        REPLY_ID => "REPLY",
        KERNEL_ID => "KERNEL",
        _ => "USER",
    }
}

/// Returns the name of a remote CPU id.
pub fn remote_cpu_name(id: u32) -> Option<&'static str> {
    match id {
        AUDIO_ID => Some("audio"),
        VIDEO_ID => Some("video"),
        VE3_ID => Some("ve3"),
        HIFI_ID => Some("hifi"),
        HIFI1_ID => Some("hifi1"),
        KR4_ID => Some("kr4"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rpc_rounds_to_words() {
        assert_eq!(align_rpc(0), 0);
        assert_eq!(align_rpc(1), 4);
        assert_eq!(align_rpc(4), 4);
        assert_eq!(align_rpc(13), 16);
    }

    #[test]
    fn hifi_needs_cache_line_alignment() {
        assert_eq!(align_for_remote(13, HIFI_ID), 128);
        assert_eq!(align_for_remote(129, HIFI1_ID), 256);
        assert_eq!(align_for_remote(13, AUDIO_ID), 16);
    }

    #[test]
    fn names() {
        assert_eq!(program_name(REPLY_ID), "REPLY");
        assert_eq!(program_name(KERNEL_ID), "KERNEL");
        assert_eq!(program_name(1), "USER");
        assert_eq!(remote_cpu_name(KR4_ID), Some("kr4"));
        assert_eq!(remote_cpu_name(0), None);
    }
}
