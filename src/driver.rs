//! Driver spawns and manages the replay task

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::camera::{CameraType, FrameSink, enabled_cameras};
use crate::config::ReplayFlags;
use crate::provider::{EventPacket, Provider};

/// Events buffered between the replay task and the consumer.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Consecutive provider errors tolerated before the task gives up.
const MAX_ERRORS: u32 = 10;

/// Result of spawning the driver task
pub struct DriverChannels {
    /// Every event in replay order; ends when the provider does
    pub events: ReceiverStream<EventPacket>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    /// Resolves to the number of events replayed
    pub task: JoinHandle<u64>,
}

/// Driver spawns the task that pulls events from a provider
///
/// Frame events go to the sink of their camera before the event itself is
/// sent on the channel, so a consumer never sees a frame event ahead of its
/// frame.
pub struct Driver;

impl Driver {
    /// Spawn the replay task for the given provider
    ///
    /// `sink` receives frames for the cameras `flags` enables. With
    /// [`ReplayFlags::NO_VIPC`] the sink is dropped unused.
    pub fn spawn<P>(provider: P, sink: Option<Box<dyn FrameSink>>, flags: ReplayFlags) -> DriverChannels
    where
        P: Provider,
    {
        Self::spawn_with_buffer(provider, sink, flags, DEFAULT_EVENT_BUFFER)
    }

    pub fn spawn_with_buffer<P>(
        provider: P,
        sink: Option<Box<dyn FrameSink>>,
        flags: ReplayFlags,
        buffer: usize,
    ) -> DriverChannels
    where
        P: Provider,
    {
        let (event_tx, event_rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();

        let cameras = enabled_cameras(flags);
        let sink = match sink {
            Some(_) if cameras.is_empty() => {
                debug!("Frame publishing disabled ({})", flags);
                None
            }
            sink => sink,
        };

        let task = tokio::spawn(Self::replay_task(provider, sink, cameras, flags, event_tx, cancel.clone()));

        DriverChannels { events: ReceiverStream::new(event_rx), cancel, task }
    }

    async fn replay_task<P>(
        mut provider: P,
        mut sink: Option<Box<dyn FrameSink>>,
        cameras: Vec<CameraType>,
        flags: ReplayFlags,
        event_tx: mpsc::Sender<EventPacket>,
        cancel: CancellationToken,
    ) -> u64
    where
        P: Provider,
    {
        info!("Replay task started (cameras: {:?})", cameras);
        let mut event_count = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Replay cancelled");
                    break;
                }
                result = provider.next_event() => result,
            };

            let packet = match result {
                Ok(Some(packet)) => {
                    error_count = 0;
                    packet
                }
                Ok(None) => {
                    info!("Provider stream ended after {} events", event_count);
                    if let Some(sink) = sink.as_mut() {
                        if let Err(e) = sink.flush().await {
                            warn!("Frame sink flush failed: {}", e);
                        }
                    }
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!("Provider error ({}/{}): {}", error_count, MAX_ERRORS, e);
                    if error_count >= MAX_ERRORS {
                        error!("Too many provider errors, shutting down");
                        break;
                    }
                    let backoff = std::time::Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => continue,
                    }
                }
            };

            if let Some(sink) = sink.as_mut() {
                if let Some(camera) = frame_camera(&packet, &cameras, flags) {
                    trace!("Frame for {} camera at {}", camera, packet.event.mono_time);
                    if let Err(e) = sink.push_frame(camera, &packet.event, packet.payload()).await {
                        warn!("Failed to push {} camera frame at {}: {}", camera, packet.event.mono_time, e);
                    }
                }
            }

            let sent = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Replay cancelled while consumer was busy");
                    break;
                }
                sent = event_tx.send(packet) => sent,
            };
            if sent.is_err() {
                debug!("Event receiver dropped, shutting down");
                break;
            }
            event_count += 1;
        }

        info!("Replay task ended ({} events)", event_count);
        event_count
    }
}

/// Enabled camera a synthesized frame event belongs to.
fn frame_camera(packet: &EventPacket, cameras: &[CameraType], flags: ReplayFlags) -> Option<CameraType> {
    if !packet.event.is_frame() {
        return None;
    }
    CameraType::from_event_kind(packet.event.kind, flags).filter(|camera| cameras.contains(camera))
}
