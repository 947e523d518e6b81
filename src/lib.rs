//! Ingestion of recorded vehicle telemetry logs.
//!
//! drivelog turns a remote or local log file into an ordered, filtered list of
//! typed events, ready to be replayed.
//!
//! # Features
//!
//! - **Parallel download**: byte-range requests split across up to 15 parts
//! - **Decompression**: bzip2 and zstd, picked by extension or magic bytes
//! - **Zero-copy parsing**: events reference the decompressed buffer directly,
//!   or a compact arena copy in low-memory mode
//! - **Frame index synthesis** and legacy `controlsState` migration
//! - **Replay**: real-time pacing, looping and camera frame routing
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use drivelog::http::{DownloadStats, Downloader};
//! use drivelog::providers::ReplayProvider;
//! use drivelog::{Driver, ReplayConfig};
//! use futures::StreamExt;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     drivelog::logging::init();
//!     let config = ReplayConfig::from_file("replay.yaml")?;
//!
//!     // One segment's log; resolving a route to its segments happens elsewhere
//!     let url = std::env::args().nth(1).ok_or("usage: replay <segment log URL or path>")?;
//!
//!     let downloader = Downloader::new(Arc::new(DownloadStats::new()));
//!     let mut reader = config.log_reader()?;
//!     reader
//!         .load(&url, &config.load_options(), &downloader, &CancellationToken::new())
//!         .await?;
//!
//!     let provider = ReplayProvider::new(Arc::new(reader), &config)?;
//!     let mut channels = Driver::spawn(provider, None, config.flags);
//!     while let Some(packet) = channels.events.next().await {
//!         println!("{} @ {}", packet.event.kind, packet.event.mono_time);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod arena;
pub mod config;
mod error;
pub mod event;
pub mod logging;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod util;

// Ingestion pipeline
pub mod decompress;
pub mod http;
pub mod reader;
pub mod schema;
pub mod wire;

// Replay
pub mod camera;
pub mod driver;
pub mod provider;
pub mod providers;

// Core exports
pub use arena::{Arena, ArenaSlice};
pub use error::*;
pub use event::{Event, Payload, Span};

// Pipeline exports
pub use decompress::Codec;
pub use reader::{LoadOptions, LogReader};
pub use schema::EventKind;

// Replay exports
pub use camera::{CameraType, FrameSink};
pub use config::{ReplayConfig, ReplayFlags};
pub use driver::{Driver, DriverChannels};
pub use provider::{EventPacket, Provider};
