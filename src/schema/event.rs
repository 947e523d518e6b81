//! `Event` root struct

use super::kind::EventKind;
use crate::Result;
use crate::wire::{Message, MessageBuilder, StructBuilder, StructReader};

/// Data section size of the root struct in words.
pub const EVENT_DATA_WORDS: u16 = 2;
/// Pointer section size of the root struct.
pub const EVENT_POINTER_WORDS: u16 = 1;

const MONO_TIME_OFFSET: usize = 0;
const WHICH_OFFSET: usize = 8;
/// Stored inverted so the zero default reads as `true`.
const VALID_BIT: usize = 80;
const BODY_POINTER: usize = 0;

/// Read access to the root of one log message.
#[derive(Debug, Clone, Copy)]
pub struct EventView<'r> {
    root: StructReader<'r>,
}

impl<'r> EventView<'r> {
    pub fn new(message: &'r Message<'_>) -> Result<Self> {
        Ok(Self { root: message.root()? })
    }

    pub fn kind(&self) -> EventKind {
        EventKind(self.root.read_u16(WHICH_OFFSET))
    }

    /// Monotonic capture time in nanoseconds.
    pub fn mono_time(&self) -> u64 {
        self.root.read_u64(MONO_TIME_OFFSET)
    }

    pub fn valid(&self) -> bool {
        !self.root.read_bool(VALID_BIT)
    }

    /// The union body; interpretation depends on [`kind`](Self::kind).
    pub fn body(&self) -> Result<StructReader<'r>> {
        self.root.read_struct_field(BODY_POINTER)
    }
}

/// Writes one `Event` message.
///
/// ```rust
/// use drivelog::schema::{EventBuilder, EventKind};
///
/// let bytes = EventBuilder::opaque(EventKind::CAN, 1_000, b"frame").to_bytes();
/// assert_eq!(bytes.len() % 8, 0);
/// ```
#[derive(Debug, Clone)]
pub struct EventBuilder {
    message: MessageBuilder,
    root: StructBuilder,
}

impl EventBuilder {
    pub fn new(kind: EventKind, mono_time: u64) -> Self {
        let mut message = MessageBuilder::new();
        let root = message.init_root(EVENT_DATA_WORDS, EVENT_POINTER_WORDS);
        message.set_u64(root, MONO_TIME_OFFSET, mono_time);
        message.set_u16(root, WHICH_OFFSET, kind.0);
        Self { message, root }
    }

    pub fn valid(mut self, valid: bool) -> Self {
        self.message.set_bool(self.root, VALID_BIT, !valid);
        self
    }

    /// Allocate the union body.
    pub fn init_body(&mut self, data_words: u16, pointer_words: u16) -> StructBuilder {
        self.message.init_struct(self.root, BODY_POINTER as u16, data_words, pointer_words)
    }

    pub fn message_mut(&mut self) -> &mut MessageBuilder {
        &mut self.message
    }

    pub fn finish(self) -> MessageBuilder {
        self.message
    }

    /// Event whose body carries `payload` as its only field.
    pub fn opaque(kind: EventKind, mono_time: u64, payload: &[u8]) -> MessageBuilder {
        let mut builder = Self::new(kind, mono_time);
        let body = builder.init_body(0, 1);
        builder.message.set_data(body, 0, payload);
        builder.finish()
    }
}
