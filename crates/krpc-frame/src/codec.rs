use bytes::{BufMut, Bytes, BytesMut};
use krpc_transport::ByteOrder;
use tracing::trace;

use crate::endian::{host_to_wire, wire_to_host};
use crate::error::{FrameError, Result};
use crate::rpc::{KERNEL_ID, REPLY_ID};

/// Frame header: eight 32-bit words.
pub const HEADER_SIZE: usize = 32;

/// Size of one wire word.
pub const WORD_SIZE: usize = 4;

/// Byte offset of `parameter_size` inside the header.
pub const PARAMETER_SIZE_OFFSET: usize = 24;

/// Default maximum payload size: 64 KiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

/// The fixed RPC header exchanged with a co-processor.
///
/// Wire layout, one word per field, all words in the remote's byte order:
/// ```text
/// ┌─────────┬─────────┬───────────┬────────┬─────────┬─────────┬────────────┬─────────┐
/// │ program │ version │ procedure │ task   │ sys_tid │ sys_pid │ param size │ context │
/// └─────────┴─────────┴───────────┴────────┴─────────┴─────────┴────────────┴─────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RpcHeader {
    pub program_id: u32,
    pub version_id: u32,
    pub procedure_id: u32,
    pub task_id: u32,
    pub sys_tid: u32,
    pub sys_pid: u32,
    pub parameter_size: u32,
    pub context: u32,
}

impl RpcHeader {
    /// Header fields in wire order.
    pub fn to_words(&self) -> [u32; 8] {
        [
            self.program_id,
            self.version_id,
            self.procedure_id,
            self.task_id,
            self.sys_tid,
            self.sys_pid,
            self.parameter_size,
            self.context,
        ]
    }

    pub fn from_words(words: [u32; 8]) -> Self {
        let [program_id, version_id, procedure_id, task_id, sys_tid, sys_pid, parameter_size, context] =
            words;
        Self {
            program_id,
            version_id,
            procedure_id,
            task_id,
            sys_tid,
            sys_pid,
            parameter_size,
            context,
        }
    }

    /// Parse a header whose words are in `order`.
    pub fn read_from(src: &[u8], order: ByteOrder) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                needed: HEADER_SIZE,
                available: src.len(),
            });
        }
        let mut words = [0u32; 8];
        for (word, chunk) in words.iter_mut().zip(src[..HEADER_SIZE].chunks_exact(WORD_SIZE)) {
            let mut raw = [0u8; WORD_SIZE];
            raw.copy_from_slice(chunk);
            *word = match order {
                ByteOrder::Little => u32::from_le_bytes(raw),
                ByteOrder::Big => u32::from_be_bytes(raw),
            };
        }
        Ok(Self::from_words(words))
    }

    /// Append the header with its words in `order`.
    pub fn write_to(&self, dst: &mut BytesMut, order: ByteOrder) {
        dst.reserve(HEADER_SIZE);
        for word in self.to_words() {
            match order {
                ByteOrder::Little => dst.put_u32_le(word),
                ByteOrder::Big => dst.put_u32(word),
            }
        }
    }

    /// Total frame length this header declares.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.parameter_size as usize
    }

    /// True for frames answering an earlier request.
    pub fn is_reply(&self) -> bool {
        self.program_id == REPLY_ID
    }
}

/// A decoded RPC frame. Payload words are in native order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcFrame {
    pub header: RpcHeader,
    pub payload: Bytes,
}

impl RpcFrame {
    /// Create a frame; `parameter_size` is taken from the payload length.
    pub fn new(mut header: RpcHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        header.parameter_size = payload.len() as u32;
        Self { header, payload }
    }

    /// A kernel-originated request carrying 32-bit parameters.
    pub fn request(task_id: u32, procedure_id: u32, params: &[u32]) -> Self {
        let header = RpcHeader {
            program_id: KERNEL_ID,
            version_id: KERNEL_ID,
            procedure_id,
            task_id,
            ..RpcHeader::default()
        };
        Self::new(header, words_to_bytes(params))
    }

    /// A reply to `request` carrying 32-bit results.
    pub fn reply_to(request: &RpcHeader, results: &[u32]) -> Self {
        let header = RpcHeader {
            program_id: REPLY_ID,
            version_id: REPLY_ID,
            procedure_id: request.procedure_id,
            task_id: request.task_id,
            sys_tid: request.sys_tid,
            sys_pid: request.sys_pid,
            context: request.context,
            ..RpcHeader::default()
        };
        Self::new(header, words_to_bytes(results))
    }

    /// Read payload word `index` (native order).
    pub fn payload_word(&self, index: usize) -> Option<u32> {
        let start = index.checked_mul(WORD_SIZE)?;
        let bytes = self.payload.get(start..start + WORD_SIZE)?;
        let mut raw = [0u8; WORD_SIZE];
        raw.copy_from_slice(bytes);
        Some(u32::from_ne_bytes(raw))
    }

    /// All whole payload words.
    pub fn payload_words(&self) -> Vec<u32> {
        (0..self.payload.len() / WORD_SIZE)
            .filter_map(|i| self.payload_word(i))
            .collect()
    }

    /// Return code of a reply: the word after the echoed command.
    pub fn reply_value(&self) -> Option<u32> {
        self.payload_word(1)
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode into the wire format for a remote using `order`.
    pub fn encode(&self, order: ByteOrder, dst: &mut BytesMut) -> Result<()> {
        if self.payload.len() > u32::MAX as usize {
            return Err(FrameError::PayloadTooLarge {
                size: self.payload.len(),
                max: u32::MAX as usize,
            });
        }
        let mut header = self.header;
        header.parameter_size = self.payload.len() as u32;

        let start = dst.len();
        header.write_to(dst, ByteOrder::native());
        dst.put_slice(&self.payload);
        host_to_wire(&mut dst[start..], order)
    }

    /// Encode into a fresh buffer.
    pub fn to_wire(&self, order: ByteOrder) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        self.encode(order, &mut buf)?;
        Ok(buf)
    }

    /// Decode a wire frame sent by a remote using `order`.
    ///
    /// Bytes past the declared frame length are ignored.
    pub fn decode(src: &[u8], order: ByteOrder, max_payload: usize) -> Result<Self> {
        let mut buf = BytesMut::from(src);
        Self::decode_in_place(&mut buf, order, max_payload)
    }

    /// Decode a wire frame, converting `buf` to native order in place.
    pub fn decode_in_place(buf: &mut BytesMut, order: ByteOrder, max_payload: usize) -> Result<Self> {
        let span = wire_to_host(buf, order)?;
        let payload_len = span - HEADER_SIZE;
        if payload_len > max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max: max_payload,
            });
        }

        let header = RpcHeader::read_from(buf, ByteOrder::native())?;
        buf.truncate(span);
        let payload = buf.split_off(HEADER_SIZE).freeze();
        trace!(?header, "decoded rpc frame");

        Ok(Self { header, payload })
    }
}

/// Native-order bytes of `words`.
pub fn words_to_bytes(words: &[u32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(words.len() * WORD_SIZE);
    for word in words {
        buf.put_slice(&word.to_ne_bytes());
    }
    buf.freeze()
}

/// Configuration for frame decoding.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 64 KiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::foreign_order;

    fn sample_header() -> RpcHeader {
        RpcHeader {
            program_id: KERNEL_ID,
            version_id: KERNEL_ID,
            procedure_id: 7,
            task_id: 1025,
            sys_tid: 11,
            sys_pid: 12,
            parameter_size: 0,
            context: 0xdead_beef,
        }
    }

    #[test]
    fn header_words_are_in_field_order() {
        let header = sample_header();
        assert_eq!(RpcHeader::from_words(header.to_words()), header);
        assert_eq!(header.to_words()[7], 0xdead_beef);
    }

    #[test]
    fn header_write_to_honors_order() {
        let header = sample_header();

        let mut big = BytesMut::new();
        header.write_to(&mut big, ByteOrder::Big);
        assert_eq!(big.len(), HEADER_SIZE);
        assert_eq!(&big[12..16], &[0, 0, 0x04, 0x01]);
        assert_eq!(&big[28..32], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(RpcHeader::read_from(&big, ByteOrder::Big).unwrap(), header);

        let mut little = BytesMut::new();
        header.write_to(&mut little, ByteOrder::Little);
        assert_eq!(&little[28..32], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(RpcHeader::read_from(&little, ByteOrder::Little).unwrap(), header);
    }

    #[test]
    fn big_endian_wire_layout_is_bit_exact() {
        let frame = RpcFrame::request(0x0102_0304, 5, &[0xAABB_CCDD]);
        let wire = frame.to_wire(ByteOrder::Big).unwrap();

        assert_eq!(wire.len(), HEADER_SIZE + 4);
        assert_eq!(&wire[0..4], &[0, 0, 0, KERNEL_ID as u8]);
        assert_eq!(&wire[12..16], &[1, 2, 3, 4]);
        assert_eq!(&wire[24..28], &[0, 0, 0, 4]);
        assert_eq!(&wire[32..36], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn little_endian_wire_layout_is_bit_exact() {
        let frame = RpcFrame::request(0x0102_0304, 5, &[0xAABB_CCDD]);
        let wire = frame.to_wire(ByteOrder::Little).unwrap();

        assert_eq!(&wire[12..16], &[4, 3, 2, 1]);
        assert_eq!(&wire[32..36], &[0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn decode_recovers_foreign_order_frame() {
        let frame = RpcFrame::new(sample_header(), words_to_bytes(&[1, 2, 3, 4]));
        let order = foreign_order();

        let wire = frame.to_wire(order).unwrap();
        let decoded = RpcFrame::decode(&wire, order, DEFAULT_MAX_PAYLOAD).unwrap();

        assert_eq!(decoded, frame);
        assert_eq!(decoded.header.parameter_size, 16);
        assert_eq!(decoded.payload_words(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn decode_ignores_trailing_padding() {
        let frame = RpcFrame::request(1, 2, &[3]);
        let mut wire = frame.to_wire(ByteOrder::Big).unwrap();
        wire.extend_from_slice(&[0xFF; 8]);

        let decoded = RpcFrame::decode(&wire, ByteOrder::Big, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(decoded.payload.len(), 4);
        assert_eq!(decoded.payload_word(0), Some(3));
    }

    #[test]
    fn decode_rejects_truncated_header() {
        let err = RpcFrame::decode(&[0u8; 20], ByteOrder::Little, DEFAULT_MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { needed: HEADER_SIZE, available: 20 }));
    }

    #[test]
    fn decode_rejects_oversized_payload() {
        let frame = RpcFrame::request(1, 2, &[0; 8]);
        let wire = frame.to_wire(ByteOrder::Little).unwrap();

        let err = RpcFrame::decode(&wire, ByteOrder::Little, 16).unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLarge { size: 32, max: 16 });
    }

    #[test]
    fn encode_rejects_unswappable_payload_for_foreign_remote() {
        let frame = RpcFrame::new(sample_header(), Bytes::from_static(b"abc"));
        let err = frame.to_wire(foreign_order()).unwrap_err();
        assert_eq!(err, FrameError::Misaligned(HEADER_SIZE + 3));
        assert!(frame.to_wire(ByteOrder::native()).is_ok());
    }

    #[test]
    fn new_overrides_declared_parameter_size() {
        let header = RpcHeader {
            parameter_size: 999,
            ..sample_header()
        };
        let frame = RpcFrame::new(header, vec![0u8; 8]);
        assert_eq!(frame.header.parameter_size, 8);
        assert_eq!(frame.header.frame_len(), frame.wire_size());
    }

    #[test]
    fn reply_to_echoes_request_identity() {
        let request = RpcFrame::request(1030, 3, &[0x10]);
        let reply = RpcFrame::reply_to(&request.header, &[0x10, crate::rpc::S_OK]);

        assert!(reply.header.is_reply());
        assert_eq!(reply.header.task_id, 1030);
        assert_eq!(reply.header.procedure_id, 3);
        assert_eq!(reply.reply_value(), Some(crate::rpc::S_OK));
    }

    #[test]
    fn payload_word_out_of_range() {
        let frame = RpcFrame::request(1, 1, &[5]);
        assert_eq!(frame.payload_word(0), Some(5));
        assert_eq!(frame.payload_word(1), None);
        assert_eq!(frame.reply_value(), None);
    }
}
