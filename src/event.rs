//! Parsed event records

use std::ops::Range;

use crate::arena::ArenaSlice;
use crate::schema::EventKind;

/// Byte range of one message inside the retained source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Where an event's message bytes live.
///
/// Both variants are plain handles; resolve them with
/// [`LogReader::payload`](crate::LogReader::payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Payload {
    /// Zero-copy view into the decompressed log
    Source(Span),
    /// Copy or migrated record owned by the reader's arena
    Arena(ArenaSlice),
}

/// One timestamped, typed log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Monotonic time in nanoseconds used for ordering
    pub mono_time: u64,
    /// Always exactly one complete framed message
    pub payload: Payload,
    /// Route segment of a synthesized frame event
    pub segment: Option<i32>,
}

impl Event {
    pub fn new(kind: EventKind, mono_time: u64, payload: Payload) -> Self {
        Self { kind, mono_time, payload, segment: None }
    }

    /// Frame event synthesized from an encode index.
    pub fn frame(kind: EventKind, mono_time: u64, payload: Payload, segment: i32) -> Self {
        Self { kind, mono_time, payload, segment: Some(segment) }
    }

    /// Whether this is a synthesized frame event.
    pub fn is_frame(&self) -> bool {
        self.segment.is_some()
    }
}
