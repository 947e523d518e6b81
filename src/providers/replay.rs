//! Replay provider for loaded logs

use std::sync::Arc;
use tokio::time::{Duration, Instant, sleep_until};
use tracing::{debug, info, trace};

use crate::config::{ReplayConfig, ReplayFlags};
use crate::provider::{EventPacket, Provider};
use crate::reader::LogReader;
use crate::{LogError, Result};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Slowest and fastest accepted playback multipliers.
pub const MIN_PLAYBACK_SPEED: f32 = 0.1;
pub const MAX_PLAYBACK_SPEED: f32 = 20.0;

/// Replays a loaded log in real time, scaled by the playback speed.
pub struct ReplayProvider {
    log: Arc<LogReader>,

    /// Index of the next event to hand out
    cursor: usize,

    /// Mono time of the first event, the zero of `position_seconds`
    route_start: u64,

    speed: f32,
    looping: bool,
    loop_count: u32,

    /// Wall clock instant and log time that were aligned when pacing began
    anchor: Option<(Instant, u64)>,
}

impl std::fmt::Debug for ReplayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayProvider")
            .field("events", &self.log.len())
            .field("cursor", &self.cursor)
            .field("speed", &self.speed)
            .field("looping", &self.looping)
            .field("loop_count", &self.loop_count)
            .finish()
    }
}

impl ReplayProvider {
    /// Create a provider positioned `config.start_seconds` after the first event.
    pub fn new(log: Arc<LogReader>, config: &ReplayConfig) -> Result<Self> {
        let route_start = match log.events().first() {
            Some(event) => event.mono_time,
            None => return Err(LogError::NoEvents { source_name: config.route.clone() }),
        };

        let mut provider = Self {
            log,
            cursor: 0,
            route_start,
            speed: 1.0,
            looping: !config.flags.contains(ReplayFlags::NO_LOOP),
            loop_count: 0,
            anchor: None,
        };
        provider.set_speed(config.playback_speed);
        provider.seek(config.start_seconds)?;

        info!(
            "Replaying {} events from {}s at {}x{}",
            provider.log.len(),
            config.start_seconds,
            provider.speed,
            if provider.looping { ", looping" } else { "" }
        );
        Ok(provider)
    }

    /// Set playback speed
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.clamp(MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED);
        // Pacing restarts from the next event
        self.anchor = None;
        debug!("Playback speed set to {}x", self.speed);
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Move to the first event at least `seconds` after the start of the log.
    pub fn seek(&mut self, seconds: u32) -> Result<()> {
        let target = self.route_start.saturating_add(u64::from(seconds) * NANOS_PER_SECOND);
        let index = self.log.events().partition_point(|event| event.mono_time < target);
        if index == self.log.len() {
            return Err(LogError::config(format!(
                "cannot seek to {}s, log ends at {:.1}s",
                seconds,
                self.duration_seconds()
            )));
        }

        debug!("Seeking to {}s (event {})", seconds, index);
        self.cursor = index;
        self.anchor = None;
        Ok(())
    }

    /// Length of the log in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.log.events().last().map_or(0.0, |event| self.seconds_since_start(event.mono_time))
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn log(&self) -> &Arc<LogReader> {
        &self.log
    }

    fn seconds_since_start(&self, mono_time: u64) -> f64 {
        mono_time.saturating_sub(self.route_start) as f64 / NANOS_PER_SECOND as f64
    }

    /// Wall clock instant at which an event logged at `mono_time` is due.
    fn due_at(&mut self, mono_time: u64) -> Instant {
        let (wall, log_time) = *self.anchor.get_or_insert((Instant::now(), mono_time));
        let elapsed = mono_time.saturating_sub(log_time) as f64 / f64::from(self.speed);
        wall + Duration::from_nanos(elapsed as u64)
    }
}

#[async_trait::async_trait]
impl Provider for ReplayProvider {
    async fn next_event(&mut self) -> Result<Option<EventPacket>> {
        if self.cursor >= self.log.len() {
            if !self.looping {
                debug!("Reached end of replay");
                return Ok(None);
            }
            self.loop_count += 1;
            self.cursor = 0;
            self.anchor = None;
            debug!("Looping replay (pass {})", self.loop_count + 1);
        }

        let event = self.log.events()[self.cursor];
        sleep_until(self.due_at(event.mono_time)).await;
        self.cursor += 1;

        trace!("Event {}/{}: {} @ {}", self.cursor, self.log.len(), event.kind, event.mono_time);
        Ok(Some(EventPacket::new(event, self.loop_count, Arc::clone(&self.log))))
    }

    fn position_seconds(&self) -> f64 {
        let index = self.cursor.min(self.log.len().saturating_sub(1));
        self.log.events().get(index).map_or(0.0, |event| self.seconds_since_start(event.mono_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EventKind;
    use crate::test_utils::LogBuilder;
    use tokio_util::sync::CancellationToken;

    const SECOND: u64 = NANOS_PER_SECOND;

    /// One CAN event per second for `seconds` seconds.
    fn log(seconds: u64) -> Arc<LogReader> {
        let mut builder = LogBuilder::new();
        for s in 0..seconds {
            builder = builder.event(EventKind::CAN, 100 * SECOND + s * SECOND);
        }
        let mut reader = LogReader::new();
        reader.load_bytes(builder.build(), false, &CancellationToken::new()).unwrap();
        Arc::new(reader)
    }

    fn config(flags: ReplayFlags) -> ReplayConfig {
        ReplayConfig { route: "test".into(), flags, ..Default::default() }
    }

    #[tokio::test(start_paused = true)]
    async fn plays_once_in_real_time() -> anyhow::Result<()> {
        let mut provider = ReplayProvider::new(log(4), &config(ReplayFlags::NO_LOOP))?;
        let started = Instant::now();

        let mut times = Vec::new();
        while let Some(packet) = provider.next_event().await? {
            assert!(!packet.payload().is_empty());
            times.push(packet.event.mono_time);
        }

        assert_eq!(times.len(), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(provider.position_seconds(), 3.0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn speed_scales_pacing() -> anyhow::Result<()> {
        let config = ReplayConfig { playback_speed: 2.0, ..config(ReplayFlags::NO_LOOP) };
        let mut provider = ReplayProvider::new(log(5), &config)?;
        let started = Instant::now();

        while provider.next_event().await?.is_some() {}
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn starts_at_offset() -> anyhow::Result<()> {
        let config = ReplayConfig { start_seconds: 2, ..config(ReplayFlags::NO_LOOP) };
        let mut provider = ReplayProvider::new(log(5), &config)?;
        assert_eq!(provider.position_seconds(), 2.0);

        let first = provider.next_event().await?.unwrap();
        assert_eq!(first.event.mono_time, 102 * SECOND);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn loops_unless_disabled() -> anyhow::Result<()> {
        let mut provider = ReplayProvider::new(log(2), &config(ReplayFlags::NONE))?;

        let mut passes = Vec::new();
        for _ in 0..5 {
            passes.push(provider.next_event().await?.unwrap().loop_count);
        }
        assert_eq!(passes, vec![0, 0, 1, 1, 2]);
        assert_eq!(provider.loop_count(), 2);
        Ok(())
    }

    #[test]
    fn seeking_past_the_end_fails() {
        let config = ReplayConfig { start_seconds: 10, ..config(ReplayFlags::NONE) };
        assert!(matches!(ReplayProvider::new(log(3), &config), Err(LogError::Config { .. })));
    }

    #[test]
    fn empty_log_is_rejected() {
        let empty = Arc::new(LogReader::new());
        assert!(matches!(
            ReplayProvider::new(empty, &config(ReplayFlags::NONE)),
            Err(LogError::NoEvents { .. })
        ));
    }

    #[test]
    fn speed_is_clamped() -> anyhow::Result<()> {
        let mut provider = ReplayProvider::new(log(2), &config(ReplayFlags::NONE))?;
        provider.set_speed(1000.0);
        assert_eq!(provider.speed(), MAX_PLAYBACK_SPEED);
        provider.set_speed(0.0);
        assert_eq!(provider.speed(), MIN_PLAYBACK_SPEED);
        assert_eq!(provider.duration_seconds(), 1.0);
        Ok(())
    }
}
