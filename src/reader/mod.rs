//! Log loading: fetch, decompress, parse.
//!
//! [`LogReader`] turns one recorded log into an ordered list of [`Event`]s.
//!
//! ## Pipeline
//!
//! 1. **Fetch** - local path, local cache or parallel ranged download, with retries
//! 2. **Decompress** - codec picked from the URL extension, else from magic bytes
//! 3. **Parse** - one framed message at a time, filtered by the allow-list
//! 4. **Synthesize** - full-resolution HEVC encode indexes get a second frame event
//! 5. **Migrate** - legacy `controlsState` events gain a `selfdriveState` twin
//! 6. **Sort** - stable sort by monotonic time
//!
//! ## Memory
//!
//! Events normally point straight into the decompressed buffer, which the reader
//! keeps alive. In low-memory mode with a non-empty allow-list, the selected
//! messages are copied into the reader's [`Arena`] instead and the decompressed
//! buffer is released after parsing.
//!
//! ```rust,no_run
//! use drivelog::http::{DownloadStats, Downloader};
//! use drivelog::{EventKind, LoadOptions, LogReader};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> drivelog::Result<()> {
//! let downloader = Downloader::new(Arc::new(DownloadStats::new()));
//! let mut reader = LogReader::with_filter([EventKind::CAR_STATE, EventKind::ROAD_ENCODE_IDX]);
//! reader
//!     .load("https://example.com/route/0/rlog.zst", &LoadOptions::default(), &downloader, &CancellationToken::new())
//!     .await?;
//!
//! for (event, bytes) in reader.iter() {
//!     println!("{} @ {}: {} bytes", event.kind, event.mono_time, bytes.len());
//! }
//! # Ok(())
//! # }
//! ```

mod fetch;
mod migrate;
mod parse;

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::arena::Arena;
use crate::config::{ReplayConfig, ReplayFlags};
use crate::decompress::Codec;
use crate::event::{Event, Payload};
use crate::http::Downloader;
use crate::schema::EventKind;
use crate::util::{extract_file_name, formatted_data_size};
use crate::{LogError, Result};

/// Pause between fetch attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// How a log is fetched and held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Copy filtered events into the arena and drop the decompressed buffer
    pub low_memory: bool,
    /// Keep downloaded logs under `data_dir` and reuse them
    pub local_cache: bool,
    pub data_dir: Option<PathBuf>,
    /// Bytes per download range; `None` uses the downloader's default
    pub chunk_size: Option<u64>,
    /// Additional attempts after a failed fetch
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            low_memory: false,
            local_cache: false,
            data_dir: None,
            chunk_size: None,
            retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl LoadOptions {
    /// Options implied by a replay configuration's flags and data directory.
    pub fn from_config(config: &ReplayConfig) -> Self {
        Self {
            low_memory: config.flags.contains(ReplayFlags::LOW_MEMORY),
            local_cache: !config.flags.contains(ReplayFlags::NO_FILE_CACHE),
            data_dir: config.data_dir.clone(),
            ..Self::default()
        }
    }
}

/// Loads one log into an ordered event collection.
#[derive(Debug)]
pub struct LogReader {
    events: Vec<Event>,
    /// Decompressed log that `Payload::Source` spans refer to
    source: Option<Vec<u8>>,
    arena: Arena,
    /// Empty means every kind is kept
    allow: HashSet<EventKind>,
    requires_migration: bool,
}

impl Default for LogReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LogReader {
    /// Reader that keeps every event kind.
    pub fn new() -> Self {
        Self::with_filter(std::iter::empty())
    }

    /// Reader that keeps only the given kinds. An empty set keeps everything.
    pub fn with_filter(allow: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            events: Vec::new(),
            source: None,
            arena: Arena::new(),
            allow: allow.into_iter().collect(),
            requires_migration: true,
        }
    }

    /// Fetch, decompress and parse the log at `url`.
    ///
    /// `url` may be an `http(s)` URL or a local path. Any previously loaded
    /// events are discarded.
    pub async fn load(
        &mut self,
        url: &str,
        options: &LoadOptions,
        downloader: &Downloader,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.reset();
        let raw = fetch::read_log(url, options, downloader, cancel).await?;

        let data = match Codec::detect(url, &raw) {
            Some(codec) => {
                let decompressed = codec.decompress(&raw, cancel)?;
                debug!(
                    "{}: {} {} -> {}",
                    extract_file_name(url),
                    codec,
                    formatted_data_size(raw.len() as u64),
                    formatted_data_size(decompressed.len() as u64)
                );
                drop(raw);
                decompressed
            }
            None => raw,
        };

        if data.is_empty() {
            return Err(LogError::NoEvents { source_name: extract_file_name(url).to_string() });
        }

        self.load_bytes_named(data, options.low_memory, cancel, extract_file_name(url))
    }

    /// Parse an already decompressed log.
    ///
    /// Any previously loaded events are discarded. On failure the events that
    /// were salvaged remain readable.
    pub fn load_bytes(&mut self, data: Vec<u8>, low_memory: bool, cancel: &CancellationToken) -> Result<()> {
        self.load_bytes_named(data, low_memory, cancel, "<memory>")
    }

    fn load_bytes_named(
        &mut self,
        data: Vec<u8>,
        low_memory: bool,
        cancel: &CancellationToken,
        source_name: &str,
    ) -> Result<()> {
        self.reset();

        let copy_to_arena = low_memory && !self.allow.is_empty();
        let outcome = self.parse_events(&data, copy_to_arena, cancel, source_name);

        // Without arena copies every retained event points into `data`
        if !copy_to_arena {
            self.source = Some(data);
        }

        if outcome.is_ok() {
            info!(
                "Loaded {} events from {} ({} in arena)",
                self.events.len(),
                source_name,
                formatted_data_size(self.arena.allocated_bytes() as u64)
            );
        }
        outcome
    }

    fn reset(&mut self) {
        self.events.clear();
        self.source = None;
        self.arena = Arena::new();
        self.requires_migration = true;
    }

    /// Events in non-decreasing `mono_time` order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The framed message bytes behind `event`.
    ///
    /// Returns an empty slice for a handle that does not belong to this reader's
    /// current contents.
    pub fn payload(&self, event: &Event) -> &[u8] {
        match event.payload {
            Payload::Source(span) => {
                self.source.as_deref().and_then(|source| source.get(span.range())).unwrap_or(&[])
            }
            Payload::Arena(slice) => self.arena.try_get(slice).unwrap_or(&[]),
        }
    }

    /// Events paired with their message bytes.
    pub fn iter(&self) -> impl Iterator<Item = (&Event, &[u8])> + '_ {
        self.events.iter().map(move |event| (event, self.payload(event)))
    }

    /// `false` once a `selfdriveState` event has been seen in the current log.
    pub fn requires_migration(&self) -> bool {
        self.requires_migration
    }

    /// Whether the decompressed buffer is still held.
    pub fn source_retained(&self) -> bool {
        self.source.is_some()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn allow_list(&self) -> &HashSet<EventKind> {
        &self.allow
    }
}
