//! controlsState -> selfdriveState migration

use tracing::{debug, info, warn};

use super::LogReader;
use crate::event::{Event, Payload};
use crate::schema::{ControlsState, EventKind, EventView, SelfdriveState};
use crate::wire::{Message, MessageBuilder};
use crate::Result;

impl LogReader {
    /// Append a `selfdriveState` event for every legacy `controlsState` event.
    ///
    /// The originals stay in place. Migrated records are serialized into the
    /// arena and share the mono time of their source. Nothing is added when the
    /// allow-list excludes `selfdriveState`.
    pub(super) fn migrate_old_events(&mut self, data: &[u8]) {
        if !self.allow.is_empty() && !self.allow.contains(&EventKind::SELFDRIVE_STATE) {
            debug!("selfdriveState not selected, skipping migration");
            return;
        }

        let original_len = self.events.len();
        let mut migrated = 0usize;

        for i in 0..original_len {
            let event = self.events[i];
            if event.kind != EventKind::CONTROLS_STATE {
                continue;
            }

            let bytes = match event.payload {
                Payload::Source(span) => &data[span.range()],
                Payload::Arena(slice) => self.arena.get(slice),
            };
            let builder = match migrate_controls_state(bytes) {
                Ok(builder) => builder,
                Err(e) => {
                    warn!("Skipping controlsState at {} during migration: {}", event.mono_time, e);
                    continue;
                }
            };

            let slice = builder.write_to_arena(&mut self.arena);
            self.events.push(Event::new(EventKind::SELFDRIVE_STATE, event.mono_time, Payload::Arena(slice)));
            migrated += 1;
        }

        if migrated > 0 {
            info!("Migrated {} controlsState events to selfdriveState", migrated);
        }
    }
}

/// Re-encode one legacy `controlsState` message as a `selfdriveState` message.
pub(crate) fn migrate_controls_state(bytes: &[u8]) -> Result<MessageBuilder> {
    let message = Message::parse(bytes)?;
    let old_event = EventView::new(&message)?;
    let old_state = ControlsState::read(&old_event.body()?)?;

    Ok(SelfdriveState::from(&old_state).to_event(old_event.mono_time(), old_event.valid()))
}
