//! Driving-state records before and after the controls/selfdrive split
//!
//! Older logs publish alert and engagement status inside `controlsState`. Newer
//! logs carry the same information in a dedicated `selfdriveState` event with a
//! different field layout. Enum-valued fields (state, alert status, size, sound
//! and personality) are kept as raw discriminants so values unknown to this
//! crate survive migration unchanged.

use super::event::EventBuilder;
use super::kind::EventKind;
use crate::Result;
use crate::wire::{MessageBuilder, StructBuilder, StructReader};

/// Section sizes of the legacy `controlsState` body.
pub const CONTROLS_DATA_WORDS: u16 = 24;
pub const CONTROLS_POINTER_WORDS: u16 = 6;

/// Section sizes of the `selfdriveState` body.
pub const SELFDRIVE_DATA_WORDS: u16 = 2;
pub const SELFDRIVE_POINTER_WORDS: u16 = 3;

// Byte offsets for numeric fields, bit offsets for booleans and pointer indexes
// for text. The legacy fields sit in the slots they had before being deprecated.
mod controls_layout {
    pub const V_CRUISE: usize = 92;
    pub const STATE: usize = 116;
    pub const ALERT_STATUS: usize = 118;
    pub const ALERT_SIZE: usize = 140;
    pub const ALERT_SOUND: usize = 168;
    pub const PERSONALITY: usize = 170;
    pub const ENABLED_BIT: usize = 704;
    pub const ACTIVE_BIT: usize = 707;
    pub const ENGAGEABLE_BIT: usize = 709;
    pub const EXPERIMENTAL_MODE_BIT: usize = 715;
    pub const ALERT_TEXT_1: usize = 1;
    pub const ALERT_TEXT_2: usize = 2;
    pub const ALERT_TYPE: usize = 3;
}

mod selfdrive_layout {
    pub const STATE: usize = 0;
    pub const ALERT_STATUS: usize = 4;
    pub const ALERT_SIZE: usize = 6;
    pub const ALERT_SOUND: usize = 8;
    pub const PERSONALITY: usize = 10;
    pub const ENABLED_BIT: usize = 16;
    pub const ACTIVE_BIT: usize = 17;
    pub const ENGAGEABLE_BIT: usize = 18;
    pub const EXPERIMENTAL_MODE_BIT: usize = 19;
    pub const ALERT_TEXT_1: usize = 0;
    pub const ALERT_TEXT_2: usize = 1;
    pub const ALERT_TYPE: usize = 2;
}

/// Legacy `controlsState` fields that moved to `selfdriveState`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlsState<'a> {
    pub enabled: bool,
    pub active: bool,
    pub engageable: bool,
    pub experimental_mode: bool,
    pub state: u16,
    pub alert_status: u16,
    pub alert_size: u16,
    pub alert_sound: u16,
    pub personality: u16,
    /// Not part of the migrated record
    pub v_cruise: f32,
    pub alert_text1: &'a [u8],
    pub alert_text2: &'a [u8],
    pub alert_type: &'a [u8],
}

impl<'a> ControlsState<'a> {
    pub fn read(body: &StructReader<'a>) -> Result<Self> {
        use controls_layout::*;
        Ok(Self {
            enabled: body.read_bool(ENABLED_BIT),
            active: body.read_bool(ACTIVE_BIT),
            engageable: body.read_bool(ENGAGEABLE_BIT),
            experimental_mode: body.read_bool(EXPERIMENTAL_MODE_BIT),
            state: body.read_u16(STATE),
            alert_status: body.read_u16(ALERT_STATUS),
            alert_size: body.read_u16(ALERT_SIZE),
            alert_sound: body.read_u16(ALERT_SOUND),
            personality: body.read_u16(PERSONALITY),
            v_cruise: body.read_f32(V_CRUISE),
            alert_text1: body.read_text_field(ALERT_TEXT_1)?,
            alert_text2: body.read_text_field(ALERT_TEXT_2)?,
            alert_type: body.read_text_field(ALERT_TYPE)?,
        })
    }

    pub fn write(&self, message: &mut MessageBuilder, body: StructBuilder) {
        use controls_layout::*;
        message.set_bool(body, ENABLED_BIT, self.enabled);
        message.set_bool(body, ACTIVE_BIT, self.active);
        message.set_bool(body, ENGAGEABLE_BIT, self.engageable);
        message.set_bool(body, EXPERIMENTAL_MODE_BIT, self.experimental_mode);
        message.set_u16(body, STATE, self.state);
        message.set_u16(body, ALERT_STATUS, self.alert_status);
        message.set_u16(body, ALERT_SIZE, self.alert_size);
        message.set_u16(body, ALERT_SOUND, self.alert_sound);
        message.set_u16(body, PERSONALITY, self.personality);
        message.set_f32(body, V_CRUISE, self.v_cruise);
        message.set_text(body, ALERT_TEXT_1 as u16, self.alert_text1);
        message.set_text(body, ALERT_TEXT_2 as u16, self.alert_text2);
        message.set_text(body, ALERT_TYPE as u16, self.alert_type);
    }

    pub fn to_event(&self, mono_time: u64) -> MessageBuilder {
        let mut event = EventBuilder::new(EventKind::CONTROLS_STATE, mono_time);
        let body = event.init_body(CONTROLS_DATA_WORDS, CONTROLS_POINTER_WORDS);
        self.write(event.message_mut(), body);
        event.finish()
    }
}

/// Current `selfdriveState` record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelfdriveState<'a> {
    pub state: u16,
    pub enabled: bool,
    pub active: bool,
    pub engageable: bool,
    pub experimental_mode: bool,
    pub alert_status: u16,
    pub alert_size: u16,
    pub alert_sound: u16,
    pub personality: u16,
    pub alert_text1: &'a [u8],
    pub alert_text2: &'a [u8],
    pub alert_type: &'a [u8],
}

impl<'a> From<&ControlsState<'a>> for SelfdriveState<'a> {
    fn from(old: &ControlsState<'a>) -> Self {
        Self {
            state: old.state,
            enabled: old.enabled,
            active: old.active,
            engageable: old.engageable,
            experimental_mode: old.experimental_mode,
            alert_status: old.alert_status,
            alert_size: old.alert_size,
            alert_sound: old.alert_sound,
            personality: old.personality,
            alert_text1: old.alert_text1,
            alert_text2: old.alert_text2,
            alert_type: old.alert_type,
        }
    }
}

impl<'a> SelfdriveState<'a> {
    pub fn read(body: &StructReader<'a>) -> Result<Self> {
        use selfdrive_layout::*;
        Ok(Self {
            state: body.read_u16(STATE),
            enabled: body.read_bool(ENABLED_BIT),
            active: body.read_bool(ACTIVE_BIT),
            engageable: body.read_bool(ENGAGEABLE_BIT),
            experimental_mode: body.read_bool(EXPERIMENTAL_MODE_BIT),
            alert_status: body.read_u16(ALERT_STATUS),
            alert_size: body.read_u16(ALERT_SIZE),
            alert_sound: body.read_u16(ALERT_SOUND),
            personality: body.read_u16(PERSONALITY),
            alert_text1: body.read_text_field(ALERT_TEXT_1)?,
            alert_text2: body.read_text_field(ALERT_TEXT_2)?,
            alert_type: body.read_text_field(ALERT_TYPE)?,
        })
    }

    pub fn write(&self, message: &mut MessageBuilder, body: StructBuilder) {
        use selfdrive_layout::*;
        message.set_u16(body, STATE, self.state);
        message.set_bool(body, ENABLED_BIT, self.enabled);
        message.set_bool(body, ACTIVE_BIT, self.active);
        message.set_bool(body, ENGAGEABLE_BIT, self.engageable);
        message.set_bool(body, EXPERIMENTAL_MODE_BIT, self.experimental_mode);
        message.set_u16(body, ALERT_STATUS, self.alert_status);
        message.set_u16(body, ALERT_SIZE, self.alert_size);
        message.set_u16(body, ALERT_SOUND, self.alert_sound);
        message.set_u16(body, PERSONALITY, self.personality);
        message.set_text(body, ALERT_TEXT_1 as u16, self.alert_text1);
        message.set_text(body, ALERT_TEXT_2 as u16, self.alert_text2);
        message.set_text(body, ALERT_TYPE as u16, self.alert_type);
    }

    /// Wrap this record in a `selfdriveState` event.
    pub fn to_event(&self, mono_time: u64, valid: bool) -> MessageBuilder {
        let mut event = EventBuilder::new(EventKind::SELFDRIVE_STATE, mono_time).valid(valid);
        let body = event.init_body(SELFDRIVE_DATA_WORDS, SELFDRIVE_POINTER_WORDS);
        self.write(event.message_mut(), body);
        event.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EventView;
    use crate::test_utils::{legacy_controls_state, legacy_controls_state_message};
    use crate::wire::Message;

    fn sample() -> ControlsState<'static> {
        ControlsState {
            enabled: true,
            active: false,
            engageable: true,
            experimental_mode: true,
            state: 3,
            alert_status: 2,
            alert_size: 1,
            alert_sound: 9,
            personality: 2,
            v_cruise: 88.5,
            alert_text1: b"TAKE CONTROL",
            alert_text2: b"Steering saturated",
            alert_type: b"steerSaturated/warning",
        }
    }

    #[test]
    fn controls_state_round_trip() {
        let bytes = sample().to_event(10).to_bytes();
        let message = Message::parse(&bytes).unwrap();
        let body = EventView::new(&message).unwrap().body().unwrap();
        assert_eq!(ControlsState::read(&body).unwrap(), sample());
    }

    #[test]
    fn migration_copies_every_shared_field() {
        let old = sample();
        let new = SelfdriveState::from(&old);

        let bytes = new.to_event(10, false).to_bytes();
        let message = Message::parse(&bytes).unwrap();
        let view = EventView::new(&message).unwrap();
        assert_eq!(view.kind(), EventKind::SELFDRIVE_STATE);
        assert!(!view.valid());

        let read = SelfdriveState::read(&view.body().unwrap()).unwrap();
        assert_eq!(read, new);
        assert_eq!(read.state, old.state);
        assert_eq!(read.alert_sound, old.alert_sound);
        assert_eq!(read.alert_type, old.alert_type);
        assert!(read.experimental_mode);
    }

    #[test]
    fn reads_hand_assembled_controls_state() {
        let bytes = legacy_controls_state_message(42, true);
        let message = Message::parse(&bytes).unwrap();
        let view = EventView::new(&message).unwrap();
        assert_eq!(view.kind(), EventKind::CONTROLS_STATE);
        assert_eq!(view.mono_time(), 42);
        assert!(view.valid());

        let old = ControlsState::read(&view.body().unwrap()).unwrap();
        assert_eq!(old, legacy_controls_state());
    }

    #[test]
    fn writer_matches_hand_assembled_layout() {
        let ours = legacy_controls_state().to_event(42).to_bytes();
        let message = Message::parse(&ours).unwrap();
        let body = EventView::new(&message).unwrap().body().unwrap();
        assert_eq!(body.data_len(), CONTROLS_DATA_WORDS as usize * 8);
        assert_eq!(body.pointer_count(), CONTROLS_POINTER_WORDS as usize);
        assert_eq!(body.read_u16(116), 3);
        assert_eq!(body.read_f32(92), 40.0);
        assert!(body.read_bool(704));
        assert_eq!(body.read_text_field(3).unwrap(), b"steerSaturated");
    }

    #[test]
    fn layouts_differ_between_encodings() {
        // The same bytes read through the other layout must not agree
        let bytes = sample().to_event(10).to_bytes();
        let message = Message::parse(&bytes).unwrap();
        let body = EventView::new(&message).unwrap().body().unwrap();
        let misread = SelfdriveState::read(&body).unwrap();
        assert_ne!(misread, SelfdriveState::from(&sample()));
    }
}
