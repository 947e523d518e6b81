//! Message stream walk

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::LogReader;
use crate::event::{Event, Payload, Span};
use crate::schema::{EncodeIndex, EventKind, EventView};
use crate::wire::{MESSAGE_ALIGNMENT, Message, WORD_BYTES};
use crate::{LogError, Result};

/// Capacity reserved up front, matching a typical one-minute segment.
const MAX_INITIAL_EVENTS: usize = 65_000;

/// Rough lower bound of a framed message, used to size the reservation.
const TYPICAL_MESSAGE_BYTES: usize = 64;

impl LogReader {
    /// Walk every message in `data` and build the sorted event list.
    ///
    /// A message that fails to decode ends the walk; everything produced before
    /// it is kept and the failure is only logged.
    pub(super) fn parse_events(
        &mut self,
        data: &[u8],
        copy_to_arena: bool,
        cancel: &CancellationToken,
        source_name: &str,
    ) -> Result<()> {
        self.events.reserve((data.len() / TYPICAL_MESSAGE_BYTES).min(MAX_INITIAL_EVENTS));

        let mut offset = 0;
        // A partial trailing word can never hold a message
        while data.len() - offset >= WORD_BYTES && !cancel.is_cancelled() {
            if let Err(e) = self.parse_one(data, &mut offset, copy_to_arena) {
                warn!(
                    "Failed to parse log: {}. Retrieved {} events from corrupt log {}",
                    e,
                    self.events.len(),
                    source_name
                );
                break;
            }
        }

        if self.requires_migration {
            self.migrate_old_events(data);
        }

        if cancel.is_cancelled() {
            debug!("Parsing {} aborted after {} events", source_name, self.events.len());
            return Err(LogError::Aborted);
        }
        if self.events.is_empty() {
            return Err(LogError::NoEvents { source_name: source_name.to_string() });
        }

        self.events.shrink_to_fit();
        self.events.sort_by_key(|event| event.mono_time);
        Ok(())
    }

    /// Decode the message at `*offset` and advance past it.
    fn parse_one(&mut self, data: &[u8], offset: &mut usize, copy_to_arena: bool) -> Result<()> {
        let message = Message::parse(&data[*offset..])?;
        let view = EventView::new(&message)?;
        let kind = view.kind();
        let mono_time = view.mono_time();

        let span = Span { offset: *offset, len: message.byte_len() };
        *offset += span.len;

        if kind == EventKind::SELFDRIVE_STATE {
            self.requires_migration = false;
        }

        if !self.allow.is_empty() && !self.allow.contains(&kind) {
            return Ok(());
        }

        let payload = if copy_to_arena {
            Payload::Arena(self.arena.alloc_copy(&data[span.range()], MESSAGE_ALIGNMENT))
        } else {
            Payload::Source(span)
        };
        self.events.push(Event::new(kind, mono_time, payload));

        // Encoded frames are announced a second time, stamped with their capture time
        if kind.is_frame_index() {
            let index = EncodeIndex::read(&view.body()?);
            if index.is_full_hevc() {
                let time = if index.timestamp_sof != 0 { index.timestamp_sof } else { mono_time };
                self.events.push(Event::frame(kind, time, payload, index.segment_num));
            }
        }

        Ok(())
    }
}
