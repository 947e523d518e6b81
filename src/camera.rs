//! Camera frame routing
//!
//! Decoding and publishing video frames is left to a [`FrameSink`]. This module
//! decides which encode-index events belong to which camera, and which cameras a
//! replay drives at all.

use std::fmt;

use crate::config::ReplayFlags;
use crate::event::Event;
use crate::schema::EventKind;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CameraType {
    Road,
    Driver,
    Wide,
}

impl CameraType {
    pub const ALL: [CameraType; 3] = [CameraType::Road, CameraType::Driver, CameraType::Wide];

    /// Encode-index kind whose frames feed this camera.
    ///
    /// The road camera reads the low-resolution stream when `QCAMERA` is set.
    pub fn encode_index_kind(self, flags: ReplayFlags) -> EventKind {
        match self {
            CameraType::Road if flags.contains(ReplayFlags::QCAMERA) => EventKind::Q_ROAD_ENCODE_IDX,
            CameraType::Road => EventKind::ROAD_ENCODE_IDX,
            CameraType::Driver => EventKind::DRIVER_ENCODE_IDX,
            CameraType::Wide => EventKind::WIDE_ROAD_ENCODE_IDX,
        }
    }

    /// Camera fed by events of `kind`, if any.
    pub fn from_event_kind(kind: EventKind, flags: ReplayFlags) -> Option<CameraType> {
        Self::ALL.into_iter().find(|camera| camera.encode_index_kind(flags) == kind)
    }

    /// Whether the flags let this camera run.
    pub fn is_enabled(self, flags: ReplayFlags) -> bool {
        match self {
            CameraType::Road => true,
            CameraType::Driver => flags.contains(ReplayFlags::DCAM),
            CameraType::Wide => flags.contains(ReplayFlags::ECAM),
        }
    }
}

impl fmt::Display for CameraType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CameraType::Road => "road",
            CameraType::Driver => "driver",
            CameraType::Wide => "wide",
        })
    }
}

/// Cameras a replay with `flags` publishes frames for.
pub fn enabled_cameras(flags: ReplayFlags) -> Vec<CameraType> {
    if flags.contains(ReplayFlags::NO_VIPC) {
        return Vec::new();
    }
    CameraType::ALL.into_iter().filter(|camera| camera.is_enabled(flags)).collect()
}

/// Receives frame events for decoding and publishing.
///
/// `frame` must hold a segment number; its payload is the encode-index message
/// the frame was synthesized from. Implementations may take as long as a decode
/// needs: the driver waits for each call before sending the next frame.
#[async_trait::async_trait]
pub trait FrameSink: Send + 'static {
    async fn push_frame(&mut self, camera: CameraType, frame: &Event, payload: &[u8]) -> Result<()>;

    /// Wait until every pushed frame has been published.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
