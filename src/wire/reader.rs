//! Zero-copy message reader

use super::WORD_BYTES;
use crate::{LogError, Result};

/// Upper bound on the segment count accepted from a segment table.
const MAX_SEGMENTS: usize = 512;

const KIND_STRUCT: u64 = 0;
const KIND_LIST: u64 = 1;
const KIND_FAR: u64 = 2;

/// List element size code for single bytes.
const ELEMENT_BYTE: u64 = 2;

/// One message decoded from the front of a buffer.
#[derive(Debug, Clone)]
pub struct Message<'a> {
    segments: Vec<&'a [u8]>,
    byte_len: usize,
}

/// Resolved pointer target: segment, first word and the tag describing it.
#[derive(Debug, Clone, Copy)]
struct Target {
    segment: usize,
    start: usize,
    tag: u64,
}

impl<'a> Message<'a> {
    /// Decode the message at the start of `buf`.
    ///
    /// Trailing bytes after the message are left untouched; use
    /// [`byte_len`](Self::byte_len) to find the next one.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let count = read_u32_le(buf, 0, "segment count")? as usize + 1;
        if count > MAX_SEGMENTS {
            return Err(LogError::parse(
                "Segment table",
                format!("{} segments exceeds limit of {}", count, MAX_SEGMENTS),
            ));
        }

        let header_len = (count / 2 + 1) * WORD_BYTES;
        if buf.len() < header_len {
            return Err(LogError::parse(
                "Segment table",
                format!("need {} header bytes, have {}", header_len, buf.len()),
            ));
        }

        let mut segments = Vec::with_capacity(count);
        let mut offset = header_len;
        for i in 0..count {
            let words = read_u32_le(buf, 4 + i * 4, "segment size")? as usize;
            let end = words
                .checked_mul(WORD_BYTES)
                .and_then(|len| offset.checked_add(len))
                .filter(|&end| end <= buf.len())
                .ok_or_else(|| {
                    LogError::parse(
                        "Segment table",
                        format!(
                            "segment {} of {} words runs past end of buffer ({} bytes left)",
                            i,
                            words,
                            buf.len() - offset
                        ),
                    )
                })?;
            segments.push(&buf[offset..end]);
            offset = end;
        }

        Ok(Self { segments, byte_len: offset })
    }

    /// Bytes occupied by this message, including its segment table.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// The root struct. A null root reads as a struct with every field defaulted.
    pub fn root(&self) -> Result<StructReader<'_>> {
        self.read_struct(self.resolve(0, 0)?)
    }

    fn word(&self, segment: usize, index: usize) -> Result<u64> {
        let seg = self.segments.get(segment).ok_or_else(|| {
            LogError::parse("Pointer", format!("segment {} does not exist", segment))
        })?;
        let start = index.checked_mul(WORD_BYTES).unwrap_or(usize::MAX);
        seg.get(start..start.saturating_add(WORD_BYTES))
            .and_then(|bytes| bytes.try_into().ok())
            .map(u64::from_le_bytes)
            .ok_or_else(|| {
                LogError::parse("Pointer", format!("word {} outside segment {}", index, segment))
            })
    }

    /// Follow the pointer stored at `(segment, index)` through any far pointers.
    fn resolve(&self, segment: usize, index: usize) -> Result<Option<Target>> {
        let pointer = self.word(segment, index)?;
        if pointer == 0 {
            return Ok(None);
        }

        match pointer & 3 {
            KIND_FAR => {
                let double_far = (pointer >> 2) & 1 == 1;
                let pad_index = ((pointer as u32) >> 3) as usize;
                let pad_segment = (pointer >> 32) as usize;
                let pad = self.word(pad_segment, pad_index)?;

                if !double_far {
                    if pad & 3 == KIND_FAR {
                        return Err(LogError::parse("Far pointer", "landing pad is another far pointer"));
                    }
                    let start = relative_target(pad_index, pad)?;
                    return Ok(Some(Target { segment: pad_segment, start, tag: pad }));
                }

                if pad & 3 != KIND_FAR || (pad >> 2) & 1 == 1 {
                    return Err(LogError::parse("Far pointer", "malformed double-far landing pad"));
                }
                let tag = self.word(pad_segment, pad_index + 1)?;
                let start = ((pad as u32) >> 3) as usize;
                Ok(Some(Target { segment: (pad >> 32) as usize, start, tag }))
            }
            KIND_STRUCT | KIND_LIST => {
                let start = relative_target(index, pointer)?;
                Ok(Some(Target { segment, start, tag: pointer }))
            }
            _ => Err(LogError::parse("Pointer", "capability pointers are not supported")),
        }
    }

    fn read_struct(&self, target: Option<Target>) -> Result<StructReader<'_>> {
        let Some(target) = target else {
            return Ok(StructReader::empty(self));
        };
        if target.tag & 3 != KIND_STRUCT {
            return Err(LogError::parse("Struct pointer", "pointer does not reference a struct"));
        }

        let data_words = ((target.tag >> 32) & 0xFFFF) as usize;
        let pointer_words = (target.tag >> 48) as usize;
        let segment = self.segment_bytes(target.segment)?;

        let start = target.start * WORD_BYTES;
        let data_end = start + data_words * WORD_BYTES;
        let end = data_end + pointer_words * WORD_BYTES;
        if end > segment.len() {
            return Err(LogError::parse(
                "Struct pointer",
                format!(
                    "struct at word {} ({} data, {} pointer words) overruns segment {}",
                    target.start, data_words, pointer_words, target.segment
                ),
            ));
        }

        Ok(StructReader {
            message: self,
            segment: target.segment,
            data: &segment[start..data_end],
            pointers: target.start + data_words,
            pointer_count: pointer_words,
        })
    }

    fn read_bytes(&self, target: Option<Target>) -> Result<&[u8]> {
        let Some(target) = target else {
            return Ok(&[]);
        };
        if target.tag & 3 != KIND_LIST || (target.tag >> 32) & 7 != ELEMENT_BYTE {
            return Err(LogError::parse("List pointer", "pointer does not reference a byte list"));
        }

        let count = (target.tag >> 35) as usize;
        let segment = self.segment_bytes(target.segment)?;
        let start = target.start * WORD_BYTES;
        segment.get(start..start + count).ok_or_else(|| {
            LogError::parse(
                "List pointer",
                format!("{} byte list at word {} overruns segment {}", count, target.start, target.segment),
            )
        })
    }

    fn segment_bytes(&self, segment: usize) -> Result<&[u8]> {
        self.segments
            .get(segment)
            .copied()
            .ok_or_else(|| LogError::parse("Pointer", format!("segment {} does not exist", segment)))
    }
}

/// View of one struct inside a [`Message`].
///
/// Data fields outside the encoded data section read as zero, which is how older
/// writers with smaller structs stay compatible with newer readers.
#[derive(Debug, Clone, Copy)]
pub struct StructReader<'r> {
    message: &'r Message<'r>,
    segment: usize,
    data: &'r [u8],
    /// Word index of the pointer section within `segment`
    pointers: usize,
    pointer_count: usize,
}

impl<'r> StructReader<'r> {
    fn empty(message: &'r Message<'r>) -> Self {
        Self { message, segment: 0, data: &[], pointers: 0, pointer_count: 0 }
    }

    /// Size of the data section in bytes.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    pub fn pointer_count(&self) -> usize {
        self.pointer_count
    }

    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data.get(offset).copied().unwrap_or(0)
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        self.field::<2>(offset).map_or(0, u16::from_le_bytes)
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        self.field::<4>(offset).map_or(0, u32::from_le_bytes)
    }

    pub fn read_i32(&self, offset: usize) -> i32 {
        self.field::<4>(offset).map_or(0, i32::from_le_bytes)
    }

    pub fn read_u64(&self, offset: usize) -> u64 {
        self.field::<8>(offset).map_or(0, u64::from_le_bytes)
    }

    pub fn read_f32(&self, offset: usize) -> f32 {
        f32::from_bits(self.read_u32(offset))
    }

    /// Read the boolean stored at bit `bit` of the data section.
    pub fn read_bool(&self, bit: usize) -> bool {
        self.data.get(bit / 8).is_some_and(|byte| (byte >> (bit % 8)) & 1 == 1)
    }

    /// Struct referenced by pointer `index`; null reads as an all-default struct.
    pub fn read_struct_field(&self, index: usize) -> Result<StructReader<'r>> {
        let target = self.pointer_target(index)?;
        self.message.read_struct(target)
    }

    /// Text referenced by pointer `index`, without its NUL terminator.
    pub fn read_text_field(&self, index: usize) -> Result<&'r [u8]> {
        let bytes = self.message.read_bytes(self.pointer_target(index)?)?;
        Ok(bytes.strip_suffix(&[0]).unwrap_or(bytes))
    }

    /// Raw bytes referenced by pointer `index`.
    pub fn read_data_field(&self, index: usize) -> Result<&'r [u8]> {
        self.message.read_bytes(self.pointer_target(index)?)
    }

    fn field<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        self.data.get(offset..offset.checked_add(N)?)?.try_into().ok()
    }

    fn pointer_target(&self, index: usize) -> Result<Option<Target>> {
        if index >= self.pointer_count {
            return Ok(None);
        }
        self.message.resolve(self.segment, self.pointers + index)
    }
}

fn relative_target(index: usize, pointer: u64) -> Result<usize> {
    let offset = ((pointer as u32) as i32 >> 2) as i64;
    let target = index as i64 + 1 + offset;
    usize::try_from(target)
        .map_err(|_| LogError::parse("Pointer", format!("offset {} points before segment start", offset)))
}

fn read_u32_le(data: &[u8], offset: usize, what: &str) -> Result<u32> {
    data.get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| {
            LogError::parse(
                "Segment table",
                format!(
                    "insufficient data for {} at offset {} (need 4 bytes, have {})",
                    what,
                    offset,
                    data.len().saturating_sub(offset)
                ),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::MessageBuilder;

    fn words(ws: &[u64]) -> Vec<u8> {
        ws.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn parses_single_segment_and_reports_length() {
        let mut builder = MessageBuilder::new();
        let root = builder.init_root(1, 1);
        builder.set_u64(root, 0, 0xDEAD_BEEF);
        builder.set_text(root, 0, b"hello");
        let mut bytes = builder.to_bytes();
        let len = bytes.len();
        bytes.extend_from_slice(&[0xAA; 16]);

        let message = Message::parse(&bytes).unwrap();
        assert_eq!(message.byte_len(), len);
        assert_eq!(message.segment_count(), 1);

        let root = message.root().unwrap();
        assert_eq!(root.read_u64(0), 0xDEAD_BEEF);
        assert_eq!(root.read_text_field(0).unwrap(), b"hello");
    }

    #[test]
    fn fields_past_data_section_default_to_zero() {
        let mut builder = MessageBuilder::new();
        let root = builder.init_root(1, 0);
        builder.set_u32(root, 4, 7);
        let bytes = builder.to_bytes();

        let message = Message::parse(&bytes).unwrap();
        let root = message.root().unwrap();
        assert_eq!(root.read_u32(4), 7);
        assert_eq!(root.read_u64(64), 0);
        assert!(!root.read_bool(200));
        assert_eq!(root.read_text_field(3).unwrap(), b"");
        assert_eq!(root.read_struct_field(0).unwrap().data_len(), 0);
    }

    #[test]
    fn follows_single_far_pointer_across_segments() {
        // Segment 0: far pointer to landing pad at word 0 of segment 1.
        // Segment 1: landing pad (struct ptr, 1 data word) + the struct itself.
        let far = KIND_FAR | (1u64 << 32);
        let pad = (1u64) << 32;
        let mut bytes = Vec::new();
        for header in [1u32, 1, 2, 0] {
            bytes.extend_from_slice(&header.to_le_bytes());
        }
        bytes.extend(words(&[far, pad, 0x1234]));

        let message = Message::parse(&bytes).unwrap();
        assert_eq!(message.segment_count(), 2);
        assert_eq!(message.root().unwrap().read_u64(0), 0x1234);
    }

    #[test]
    fn follows_double_far_pointer() {
        // Segment 0: double-far to segment 1 word 0.
        // Segment 1: landing pad (far to segment 2 word 0) + tag word.
        // Segment 2: struct content, 1 data word.
        let far = KIND_FAR | 0b100 | (1u64 << 32);
        let pad = KIND_FAR | (2u64 << 32);
        let tag = 1u64 << 32;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        for size in [1u32, 2, 1] {
            bytes.extend_from_slice(&size.to_le_bytes());
        }
        bytes.extend(words(&[far, pad, tag, 0x5678]));

        let message = Message::parse(&bytes).unwrap();
        assert_eq!(message.root().unwrap().read_u64(0), 0x5678);
    }

    #[test]
    fn truncated_segment_is_rejected() {
        let mut builder = MessageBuilder::new();
        let root = builder.init_root(2, 0);
        builder.set_u64(root, 8, 1);
        let bytes = builder.to_bytes();

        let err = Message::parse(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, LogError::Parse { .. }));
        assert!(Message::parse(&[]).is_err());
        assert!(Message::parse(&[0, 0, 0]).is_err());
    }

    #[test]
    fn out_of_bounds_struct_pointer_is_rejected() {
        // Root claims 4 data words but the segment holds only the pointer
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend(words(&[4u64 << 32]));

        let message = Message::parse(&bytes).unwrap();
        assert!(message.root().is_err());
    }

    #[test]
    fn capability_pointer_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend(words(&[3]));

        let message = Message::parse(&bytes).unwrap();
        assert!(message.root().is_err());
    }

    #[test]
    fn huge_segment_count_is_rejected() {
        let bytes = u32::MAX.to_le_bytes();
        assert!(Message::parse(&bytes).is_err());
    }
}
