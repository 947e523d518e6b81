//! Provider trait for event sources

use std::sync::Arc;

use crate::event::Event;
use crate::reader::LogReader;
use crate::Result;

/// One event handed out by a provider, with access to its message bytes.
#[derive(Debug, Clone)]
pub struct EventPacket {
    pub event: Event,
    /// Completed passes over the log before this event
    pub loop_count: u32,
    log: Arc<LogReader>,
}

impl EventPacket {
    pub fn new(event: Event, loop_count: u32, log: Arc<LogReader>) -> Self {
        Self { event, loop_count, log }
    }

    /// Framed message bytes of the event.
    pub fn payload(&self) -> &[u8] {
        self.log.payload(&self.event)
    }
}

/// Trait for event sources
///
/// Providers handle their own timing: `next_event` returns when the event is
/// due, not as soon as it is available.
#[async_trait::async_trait]
pub trait Provider: Send + 'static {
    /// Get the next event
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - Event due now
    /// - `Ok(None)` - Stream ended (normal termination)
    /// - `Err(e)` - Error occurred
    async fn next_event(&mut self) -> Result<Option<EventPacket>>;

    /// Seconds since the first event of the log at the current position.
    fn position_seconds(&self) -> f64;
}
