//! Camera encoder index records

use super::event::EventBuilder;
use super::kind::EventKind;
use crate::wire::{MessageBuilder, StructBuilder, StructReader};

pub const ENCODE_INDEX_DATA_WORDS: u16 = 6;

const FRAME_ID: usize = 0;
const TYPE: usize = 4;
const ENCODE_ID: usize = 8;
const SEGMENT_NUM: usize = 12;
const SEGMENT_ID: usize = 16;
const SEGMENT_ID_ENCODE: usize = 20;
const TIMESTAMP_SOF: usize = 24;
const TIMESTAMP_EOF: usize = 32;
const FLAGS: usize = 40;
const LEN: usize = 44;

/// Encoder output format of an indexed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EncodeType(pub u16);

impl EncodeType {
    pub const BIG_BOX_LOSSLESS: EncodeType = EncodeType(0);
    pub const FULL_HEVC: EncodeType = EncodeType(1);
    pub const QCAMERA_H264: EncodeType = EncodeType(6);
    pub const LIVESTREAM_H264: EncodeType = EncodeType(7);
}

/// Where one encoded camera frame lives inside its segment's video file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeIndex {
    pub frame_id: u32,
    pub encode_type: EncodeType,
    pub encode_id: u32,
    /// Route segment the frame was recorded in
    pub segment_num: i32,
    /// Frame position within the segment's video file
    pub segment_id: u32,
    pub segment_id_encode: u32,
    /// Start-of-frame capture time in nanoseconds, 0 when unknown
    pub timestamp_sof: u64,
    pub timestamp_eof: u64,
    pub flags: u32,
    pub len: u32,
}

impl EncodeIndex {
    pub fn read(body: &StructReader<'_>) -> Self {
        Self {
            frame_id: body.read_u32(FRAME_ID),
            encode_type: EncodeType(body.read_u16(TYPE)),
            encode_id: body.read_u32(ENCODE_ID),
            segment_num: body.read_i32(SEGMENT_NUM),
            segment_id: body.read_u32(SEGMENT_ID),
            segment_id_encode: body.read_u32(SEGMENT_ID_ENCODE),
            timestamp_sof: body.read_u64(TIMESTAMP_SOF),
            timestamp_eof: body.read_u64(TIMESTAMP_EOF),
            flags: body.read_u32(FLAGS),
            len: body.read_u32(LEN),
        }
    }

    pub fn write(&self, message: &mut MessageBuilder, body: StructBuilder) {
        message.set_u32(body, FRAME_ID, self.frame_id);
        message.set_u16(body, TYPE, self.encode_type.0);
        message.set_u32(body, ENCODE_ID, self.encode_id);
        message.set_i32(body, SEGMENT_NUM, self.segment_num);
        message.set_u32(body, SEGMENT_ID, self.segment_id);
        message.set_u32(body, SEGMENT_ID_ENCODE, self.segment_id_encode);
        message.set_u64(body, TIMESTAMP_SOF, self.timestamp_sof);
        message.set_u64(body, TIMESTAMP_EOF, self.timestamp_eof);
        message.set_u32(body, FLAGS, self.flags);
        message.set_u32(body, LEN, self.len);
    }

    /// Full-resolution HEVC frames are the only ones re-streamed to cameras.
    pub fn is_full_hevc(&self) -> bool {
        self.encode_type == EncodeType::FULL_HEVC
    }

    /// Wrap this index in an event of `kind`.
    pub fn to_event(&self, kind: EventKind, mono_time: u64) -> MessageBuilder {
        let mut event = EventBuilder::new(kind, mono_time);
        let body = event.init_body(ENCODE_INDEX_DATA_WORDS, 0);
        self.write(event.message_mut(), body);
        event.finish()
    }
}
