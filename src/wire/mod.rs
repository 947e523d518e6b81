//! Cap'n Proto flat-array framing used by recorded logs.
//!
//! A log is a plain concatenation of self-delimiting messages. Each message is:
//!
//! 1. **Segment table** - `u32` segment count minus one, then one `u32` word count
//!    per segment, padded to a whole 8-byte word
//! 2. **Segments** - the words themselves, back to back
//!
//! Structs and lists are reached through 64-bit pointers. Only the subset needed
//! for log ingestion is implemented: struct, byte-list and far pointers, primitive
//! data fields with zero defaults, and text. Capability pointers are rejected.
//!
//! The [`reader`] side never copies: a [`Message`] borrows the segments of the
//! buffer it was parsed from and reports how many bytes it occupied so the caller
//! can advance to the next one. The [`builder`] side writes single-segment
//! messages, which is all migration and test fixtures need.

pub mod builder;
pub mod reader;

pub use builder::{MessageBuilder, StructBuilder};
pub use reader::{Message, StructReader};

/// Size of a wire word in bytes.
pub const WORD_BYTES: usize = 8;

/// Alignment required for arena copies of whole messages.
pub const MESSAGE_ALIGNMENT: usize = WORD_BYTES;
