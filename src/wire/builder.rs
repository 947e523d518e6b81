//! Single-segment message builder

use super::WORD_BYTES;
use crate::arena::{Arena, ArenaSlice};

/// Location of a struct being built inside a [`MessageBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructBuilder {
    /// Byte offset of the data section within the segment
    data: usize,
    /// Word index of the pointer section within the segment
    pointers: usize,
    data_words: u16,
    pointer_words: u16,
}

/// Builds one single-segment message.
///
/// Objects are appended in allocation order, so a finished message always has
/// the root pointer in word 0 followed by the root struct.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    segment: Vec<u8>,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self { segment: vec![0; WORD_BYTES] }
    }

    /// Allocate the root struct.
    pub fn init_root(&mut self, data_words: u16, pointer_words: u16) -> StructBuilder {
        self.init_struct_at(0, data_words, pointer_words)
    }

    /// Allocate a struct and store a pointer to it in `parent`'s pointer `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside `parent`'s pointer section.
    pub fn init_struct(
        &mut self,
        parent: StructBuilder,
        index: u16,
        data_words: u16,
        pointer_words: u16,
    ) -> StructBuilder {
        assert!(index < parent.pointer_words, "pointer index {} out of range", index);
        self.init_struct_at(parent.pointers + index as usize, data_words, pointer_words)
    }

    /// Store NUL-terminated text in `parent`'s pointer `index`.
    pub fn set_text(&mut self, parent: StructBuilder, index: u16, text: &[u8]) {
        assert!(index < parent.pointer_words, "pointer index {} out of range", index);
        self.set_byte_list(parent.pointers + index as usize, text, true);
    }

    /// Store raw bytes in `parent`'s pointer `index`.
    pub fn set_data(&mut self, parent: StructBuilder, index: u16, data: &[u8]) {
        assert!(index < parent.pointer_words, "pointer index {} out of range", index);
        self.set_byte_list(parent.pointers + index as usize, data, false);
    }

    pub fn set_u16(&mut self, target: StructBuilder, offset: usize, value: u16) {
        self.put(target, offset, &value.to_le_bytes());
    }

    pub fn set_u32(&mut self, target: StructBuilder, offset: usize, value: u32) {
        self.put(target, offset, &value.to_le_bytes());
    }

    pub fn set_i32(&mut self, target: StructBuilder, offset: usize, value: i32) {
        self.put(target, offset, &value.to_le_bytes());
    }

    pub fn set_u64(&mut self, target: StructBuilder, offset: usize, value: u64) {
        self.put(target, offset, &value.to_le_bytes());
    }

    pub fn set_f32(&mut self, target: StructBuilder, offset: usize, value: f32) {
        self.put(target, offset, &value.to_bits().to_le_bytes());
    }

    pub fn set_bool(&mut self, target: StructBuilder, bit: usize, value: bool) {
        assert!(bit < target.data_words as usize * WORD_BYTES * 8, "bit {} outside data section", bit);
        let byte = &mut self.segment[target.data + bit / 8];
        let mask = 1u8 << (bit % 8);
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    /// Size of the framed message in bytes.
    pub fn serialized_len(&self) -> usize {
        WORD_BYTES + self.segment.len()
    }

    /// Write the framed message into `out`, which must be exactly
    /// [`serialized_len`](Self::serialized_len) bytes.
    pub fn write_to(&self, out: &mut [u8]) {
        let words = (self.segment.len() / WORD_BYTES) as u32;
        out[..4].copy_from_slice(&0u32.to_le_bytes());
        out[4..WORD_BYTES].copy_from_slice(&words.to_le_bytes());
        out[WORD_BYTES..].copy_from_slice(&self.segment);
    }

    /// Framed message as an owned buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.serialized_len()];
        self.write_to(&mut out);
        out
    }

    /// Serialize directly into a word-aligned arena allocation.
    pub fn write_to_arena(&self, arena: &mut Arena) -> ArenaSlice {
        let slice = arena.allocate(self.serialized_len(), WORD_BYTES);
        self.write_to(arena.get_mut(slice));
        slice
    }

    fn alloc(&mut self, words: usize) -> usize {
        let index = self.segment.len() / WORD_BYTES;
        self.segment.resize(self.segment.len() + words * WORD_BYTES, 0);
        index
    }

    fn init_struct_at(&mut self, pointer_index: usize, data_words: u16, pointer_words: u16) -> StructBuilder {
        let start = self.alloc(data_words as usize + pointer_words as usize);
        let pointer = (offset_bits(pointer_index, start) << 2)
            | (data_words as u64) << 32
            | (pointer_words as u64) << 48;
        self.put_word(pointer_index, pointer);

        StructBuilder {
            data: start * WORD_BYTES,
            pointers: start + data_words as usize,
            data_words,
            pointer_words,
        }
    }

    fn set_byte_list(&mut self, pointer_index: usize, bytes: &[u8], nul_terminated: bool) {
        let count = bytes.len() + usize::from(nul_terminated);
        let start = self.alloc(count.div_ceil(WORD_BYTES));
        let begin = start * WORD_BYTES;
        self.segment[begin..begin + bytes.len()].copy_from_slice(bytes);

        // Byte lists use element size code 2
        let pointer = 1 | (offset_bits(pointer_index, start) << 2) | 2u64 << 32 | (count as u64) << 35;
        self.put_word(pointer_index, pointer);
    }

    fn put(&mut self, target: StructBuilder, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= target.data_words as usize * WORD_BYTES,
            "field at byte {} outside data section",
            offset
        );
        let start = target.data + offset;
        self.segment[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn put_word(&mut self, index: usize, value: u64) {
        let start = index * WORD_BYTES;
        self.segment[start..start + WORD_BYTES].copy_from_slice(&value.to_le_bytes());
    }
}

/// 30-bit signed word offset from the word after `pointer_index` to `target`.
fn offset_bits(pointer_index: usize, target: usize) -> u64 {
    let offset = target as i64 - pointer_index as i64 - 1;
    ((offset as i32 as u32) & 0x3FFF_FFFF) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Message;

    #[test]
    fn nested_struct_and_text_round_trip() {
        let mut builder = MessageBuilder::new();
        let root = builder.init_root(2, 2);
        builder.set_u64(root, 0, 42);
        builder.set_u16(root, 8, 3);
        builder.set_bool(root, 80, true);
        let child = builder.init_struct(root, 0, 1, 1);
        builder.set_f32(child, 4, 1.5);
        builder.set_i32(child, 0, -9);
        builder.set_text(child, 0, b"alert");
        builder.set_data(root, 1, &[1, 2, 3]);

        let bytes = builder.to_bytes();
        assert_eq!(bytes.len() % WORD_BYTES, 0);

        let message = Message::parse(&bytes).unwrap();
        let root = message.root().unwrap();
        assert_eq!(root.read_u64(0), 42);
        assert_eq!(root.read_u16(8), 3);
        assert!(root.read_bool(80));
        assert_eq!(root.read_data_field(1).unwrap(), &[1, 2, 3]);

        let child = root.read_struct_field(0).unwrap();
        assert_eq!(child.read_f32(4), 1.5);
        assert_eq!(child.read_i32(0), -9);
        assert_eq!(child.read_text_field(0).unwrap(), b"alert");
    }

    #[test]
    fn empty_text_is_nul_only() {
        let mut builder = MessageBuilder::new();
        let root = builder.init_root(0, 1);
        builder.set_text(root, 0, b"");
        let bytes = builder.to_bytes();

        let message = Message::parse(&bytes).unwrap();
        let root = message.root().unwrap();
        assert_eq!(root.read_text_field(0).unwrap(), b"");
        assert_eq!(root.read_data_field(0).unwrap(), &[0]);
    }

    #[test]
    fn arena_copy_matches_owned_bytes() {
        let mut builder = MessageBuilder::new();
        let root = builder.init_root(1, 0);
        builder.set_u64(root, 0, 7);

        let mut arena = Arena::with_initial_size(64);
        let slice = builder.write_to_arena(&mut arena);
        assert_eq!(arena.get(slice), builder.to_bytes().as_slice());
        assert_eq!(arena.get(slice).as_ptr() as usize % WORD_BYTES, 0);
    }

    #[test]
    #[should_panic(expected = "outside data section")]
    fn writing_past_data_section_panics() {
        let mut builder = MessageBuilder::new();
        let root = builder.init_root(1, 0);
        builder.set_u32(root, 6, 1);
    }
}
