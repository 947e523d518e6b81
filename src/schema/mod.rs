//! Event schema: kinds, root layout and the structs the loader inspects.
//!
//! Every log message has an `Event` root struct. Its data section holds the
//! monotonic timestamp, the union discriminant that names the event kind and a
//! `valid` flag; its single pointer references the kind-specific body.
//!
//! # Layouts
//!
//! | Struct           | Data words | Pointers | Used for                        |
//! |------------------|------------|----------|---------------------------------|
//! | `Event`          | 2          | 1        | every message                   |
//! | `EncodeIndex`    | 6          | 0        | frame index synthesis           |
//! | `ControlsState`  | 24         | 6        | legacy state (migration source) |
//! | `SelfdriveState` | 2          | 3        | current state (migration target)|
//!
//! All other bodies are opaque to the loader.

pub mod encode_index;
pub mod event;
pub mod kind;
pub mod selfdrive;

pub use encode_index::{EncodeIndex, EncodeType};
pub use event::{EventBuilder, EventView};
pub use kind::EventKind;
pub use selfdrive::{ControlsState, SelfdriveState};
