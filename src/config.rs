//! Replay configuration
//!
//! A [`ReplayConfig`] is usually read from YAML:
//!
//! ```yaml
//! route: "a2a0ccea32023010|2023-07-27--13-01-19"
//! allow: [carState, roadEncodeIdx]
//! data_dir: /data/media/0/realdata
//! flags: [dcam, no_loop]
//! start_seconds: 60
//! playback_speed: 2.0
//! ```
//!
//! `flags` accepts either a raw integer or a list of flag names.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::reader::{LoadOptions, LogReader};
use crate::schema::EventKind;
use crate::{LogError, Result};

/// Fewest segments a replay keeps loaded around the playhead.
pub const MIN_SEGMENTS_CACHE: u32 = 5;

/// Services dropped unless [`ReplayFlags::ALL_SERVICES`] is set.
pub const DEFAULT_BLOCKED_SERVICES: &[&str] = &["uiDebug", "userBookmark"];

/// Replay option bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FlagsRepr", into = "u32")]
pub struct ReplayFlags(pub u32);

macro_rules! replay_flags {
    ($($konst:ident = $value:literal => $name:literal),* $(,)?) => {
        impl ReplayFlags {
            $(pub const $konst: ReplayFlags = ReplayFlags($value);)*

            const NAMED: &'static [(ReplayFlags, &'static str)] = &[$((ReplayFlags::$konst, $name)),*];
        }
    };
}

replay_flags! {
    DCAM = 0x0002 => "dcam",
    ECAM = 0x0004 => "ecam",
    NO_LOOP = 0x0010 => "no_loop",
    NO_FILE_CACHE = 0x0020 => "no_file_cache",
    QCAMERA = 0x0040 => "qcamera",
    NO_HW_DECODER = 0x0100 => "no_hw_decoder",
    NO_VIPC = 0x0400 => "no_vipc",
    ALL_SERVICES = 0x0800 => "all_services",
    LOW_MEMORY = 0x1000 => "low_memory",
}

impl ReplayFlags {
    pub const NONE: ReplayFlags = ReplayFlags(0);

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: ReplayFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ReplayFlags) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn from_name(name: &str) -> Option<ReplayFlags> {
        Self::NAMED.iter().find(|(_, n)| *n == name).map(|(flag, _)| *flag)
    }

    /// Names of the set flags, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED.iter().filter(|(flag, _)| self.contains(*flag)).map(|(_, name)| *name).collect()
    }
}

impl std::ops::BitOr for ReplayFlags {
    type Output = ReplayFlags;

    fn bitor(self, rhs: Self) -> Self {
        ReplayFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for ReplayFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        write!(f, "{}", self.names().join("|"))
    }
}

impl From<ReplayFlags> for u32 {
    fn from(flags: ReplayFlags) -> u32 {
        flags.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagsRepr {
    Bits(u32),
    Names(Vec<String>),
}

impl TryFrom<FlagsRepr> for ReplayFlags {
    type Error = String;

    fn try_from(repr: FlagsRepr) -> std::result::Result<Self, String> {
        match repr {
            FlagsRepr::Bits(bits) => Ok(ReplayFlags(bits)),
            FlagsRepr::Names(names) => names.iter().try_fold(ReplayFlags::NONE, |flags, name| {
                ReplayFlags::from_name(name)
                    .map(|flag| flags | flag)
                    .ok_or_else(|| format!("unknown replay flag '{}'", name))
            }),
        }
    }
}

/// Everything needed to replay one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub route: String,
    /// Services to keep; empty keeps all that are not blocked
    pub allow: Vec<String>,
    pub block: Vec<String>,
    /// Local cache directory for downloaded logs
    pub data_dir: Option<PathBuf>,
    /// Namespace prefix for published services
    pub prefix: Option<String>,
    pub flags: ReplayFlags,
    pub start_seconds: u32,
    pub cache_segments: u32,
    pub playback_speed: f32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            route: String::new(),
            allow: Vec::new(),
            block: Vec::new(),
            data_dir: None,
            prefix: None,
            flags: ReplayFlags::NONE,
            start_seconds: 0,
            cache_segments: MIN_SEGMENTS_CACHE,
            playback_speed: 1.0,
        }
    }
}

impl ReplayConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ReplayConfig =
            serde_yaml_ng::from_str(yaml).map_err(|e| LogError::config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| LogError::file_error(path, e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| LogError::config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.route.trim().is_empty() {
            return Err(LogError::config("route is empty"));
        }
        if self.cache_segments < MIN_SEGMENTS_CACHE {
            return Err(LogError::config(format!(
                "cache_segments must be at least {}, got {}",
                MIN_SEGMENTS_CACHE, self.cache_segments
            )));
        }
        if !self.playback_speed.is_finite() || self.playback_speed <= 0.0 {
            return Err(LogError::config(format!("playback_speed must be positive, got {}", self.playback_speed)));
        }
        self.event_filter().map(|_| ())
    }

    /// Event kinds a reader should keep. Empty keeps everything.
    ///
    /// Without [`ReplayFlags::ALL_SERVICES`] the default block list is applied
    /// when no block list is configured.
    pub fn event_filter(&self) -> Result<HashSet<EventKind>> {
        let allow = resolve_names(self.allow.as_slice())?;
        let block = if self.block.is_empty() && !self.flags.contains(ReplayFlags::ALL_SERVICES) {
            resolve_names(DEFAULT_BLOCKED_SERVICES)?
        } else {
            resolve_names(self.block.as_slice())?
        };

        if allow.is_empty() && block.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(EventKind::ALL
            .iter()
            .copied()
            .filter(|kind| (allow.is_empty() || allow.contains(kind)) && !block.contains(kind))
            .collect())
    }

    /// Empty reader set up with this configuration's filter.
    pub fn log_reader(&self) -> Result<LogReader> {
        Ok(LogReader::with_filter(self.event_filter()?))
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::from_config(self)
    }
}

fn resolve_names<S: AsRef<str>>(names: &[S]) -> Result<HashSet<EventKind>> {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            EventKind::from_name(name).ok_or_else(|| LogError::config(format!("unknown service '{}'", name)))
        })
        .collect()
}
