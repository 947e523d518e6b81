//! Synthetic logs and servers for tests and benchmarks
//!
//! Recorded drives are large and not redistributable, so tests build their logs
//! from scratch with [`LogBuilder`] and serve them with [`server::RangeServer`].

#![cfg(any(test, feature = "benchmark"))]

use crate::schema::{ControlsState, EncodeIndex, EncodeType, EventBuilder, EventKind, SelfdriveState};
use crate::wire::MessageBuilder;

/// Concatenates framed event messages into a decompressed log.
#[derive(Debug, Default, Clone)]
pub struct LogBuilder {
    bytes: Vec<u8>,
    count: usize,
}

impl LogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, message: MessageBuilder) -> Self {
        self.bytes.extend_from_slice(&message.to_bytes());
        self.count += 1;
        self
    }

    /// Append an already framed message.
    pub fn raw(mut self, message: &[u8]) -> Self {
        self.bytes.extend_from_slice(message);
        self.count += 1;
        self
    }

    /// Event with an opaque body.
    pub fn event(self, kind: EventKind, mono_time: u64) -> Self {
        let payload = mono_time.to_le_bytes();
        self.push(EventBuilder::opaque(kind, mono_time, &payload))
    }

    pub fn encode_index(self, kind: EventKind, mono_time: u64, index: EncodeIndex) -> Self {
        self.push(index.to_event(kind, mono_time))
    }

    /// Full-resolution HEVC index for `segment` captured at `sof`.
    pub fn hevc_frame(self, kind: EventKind, mono_time: u64, sof: u64, segment: i32) -> Self {
        let index = EncodeIndex {
            encode_type: EncodeType::FULL_HEVC,
            segment_num: segment,
            timestamp_sof: sof,
            ..Default::default()
        };
        self.encode_index(kind, mono_time, index)
    }

    pub fn controls_state(self, mono_time: u64, state: ControlsState<'_>) -> Self {
        self.push(state.to_event(mono_time))
    }

    pub fn selfdrive_state(self, mono_time: u64, state: SelfdriveState<'_>) -> Self {
        self.push(state.to_event(mono_time, true))
    }

    /// Number of messages written so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// A mixed log of `events` messages with interleaved, partly out-of-order times.
///
/// Roughly one in eight messages is a road camera HEVC index and one in sixteen a
/// legacy `controlsState`.
pub fn sample_log(events: usize) -> Vec<u8> {
    let kinds = [EventKind::CAN, EventKind::CAR_STATE, EventKind::MODEL_V2, EventKind::DEVICE_STATE];
    let mut log = LogBuilder::new();

    for i in 0..events as u64 {
        // Jitter of a few ms keeps neighbouring events out of order
        let mono_time = 1_000_000_000 + i * 10_000_000 + (i * 7919 % 5) * 3_000_000;
        log = match i % 16 {
            0 => log.controls_state(mono_time, sample_controls_state()),
            1 | 9 => log.hevc_frame(EventKind::ROAD_ENCODE_IDX, mono_time, mono_time - 1_000_000, (i / 1200) as i32),
            n => log.event(kinds[n as usize % kinds.len()], mono_time),
        };
    }
    log.build()
}

/// Fields of [`legacy_controls_state_message`].
pub fn legacy_controls_state() -> ControlsState<'static> {
    ControlsState {
        enabled: true,
        active: false,
        engageable: true,
        experimental_mode: true,
        state: 3,
        alert_status: 2,
        alert_size: 1,
        alert_sound: 5,
        personality: 2,
        v_cruise: 40.0,
        alert_text1: b"TAKE",
        alert_text2: b"hold",
        alert_type: b"steerSaturated",
    }
}

/// A `controlsState` event laid out by hand the way the producer writes it.
///
/// Nothing here goes through [`MessageBuilder`] or the crate's layout tables, so
/// it pins the decoder to the producer's offsets. Neighboring fields that are not
/// migrated (`steerOverride`, `rearViewCam`, `longControlState`, `cumLagMs`) are
/// set so a shifted offset reads the wrong value.
pub fn legacy_controls_state_message(mono_time: u64, valid: bool) -> Vec<u8> {
    const WORDS: usize = 38;
    const BODY: usize = 4 * 8;
    const BODY_POINTERS: usize = BODY + 24 * 8;

    fn put(segment: &mut [u8], at: usize, bytes: &[u8]) {
        segment[at..at + bytes.len()].copy_from_slice(bytes);
    }
    fn struct_pointer(offset: u64, data_words: u64, pointer_words: u64) -> [u8; 8] {
        ((offset << 2) | (data_words << 32) | (pointer_words << 48)).to_le_bytes()
    }
    fn text_pointer(offset: u64, text: &[u8]) -> [u8; 8] {
        (1 | (offset << 2) | (2 << 32) | ((text.len() as u64 + 1) << 35)).to_le_bytes()
    }

    let mut segment = vec![0u8; WORDS * 8];

    // Event root: two data words, one pointer
    put(&mut segment, 0, &struct_pointer(0, 2, 1));
    put(&mut segment, 8, &mono_time.to_le_bytes());
    put(&mut segment, 16, &6u16.to_le_bytes());
    if !valid {
        segment[8 + 10] |= 1;
    }
    put(&mut segment, 24, &struct_pointer(0, 24, 6));

    // controlsState body at word 4
    put(&mut segment, BODY + 60, &12.5f32.to_le_bytes());
    put(&mut segment, BODY + 90, &2u16.to_le_bytes());
    put(&mut segment, BODY + 92, &40.0f32.to_le_bytes());
    put(&mut segment, BODY + 116, &3u16.to_le_bytes());
    put(&mut segment, BODY + 118, &2u16.to_le_bytes());
    put(&mut segment, BODY + 140, &1u16.to_le_bytes());
    put(&mut segment, BODY + 168, &5u16.to_le_bytes());
    put(&mut segment, BODY + 170, &2u16.to_le_bytes());
    // enabled, steerOverride, rearViewCam, engageable; then experimentalMode
    segment[BODY + 88] = 0b0010_0111;
    segment[BODY + 89] = 0b0000_1000;

    let texts: [(usize, usize, &[u8]); 3] = [(1, 34, b"TAKE"), (2, 35, b"hold"), (3, 36, b"steerSaturated")];
    for (pointer, word, text) in texts {
        let at = BODY_POINTERS + pointer * 8;
        let offset = word - (at / 8 + 1);
        put(&mut segment, at, &text_pointer(offset as u64, text));
        put(&mut segment, word * 8, text);
    }

    let mut message = Vec::with_capacity(8 + segment.len());
    message.extend_from_slice(&0u32.to_le_bytes());
    message.extend_from_slice(&(WORDS as u32).to_le_bytes());
    message.extend_from_slice(&segment);
    message
}

/// Legacy controls state with every migrated field set.
pub fn sample_controls_state() -> ControlsState<'static> {
    ControlsState {
        enabled: true,
        active: true,
        engageable: true,
        experimental_mode: false,
        state: 1,
        alert_status: 1,
        alert_size: 2,
        alert_sound: 4,
        personality: 1,
        v_cruise: 100.0,
        alert_text1: b"Pedal pressed",
        alert_text2: b"",
        alert_type: b"pedalPressed/userPrompt",
    }
}

pub fn compress_bz2(data: &[u8]) -> Vec<u8> {
    use std::io::Read;
    let mut encoder = bzip2::read::BzEncoder::new(data, bzip2::Compression::best());
    let mut out = Vec::new();
    // In-memory reads cannot fail
    let _ = encoder.read_to_end(&mut out);
    out
}

pub fn compress_zstd(data: &[u8]) -> Vec<u8> {
    zstd::encode_all(data, 3).unwrap_or_default()
}

/// Mock HTTP object store that honors byte-range requests.
#[cfg(test)]
pub mod server {
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const OBJECT_PATH: &str = "/route/0/rlog";

    /// Deterministic non-repeating-looking test content.
    pub fn pattern_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
    }

    struct RangeResponder {
        body: Arc<Vec<u8>>,
        honor_ranges: bool,
        /// Delay applied to every range that does not start at 0
        stall: Option<Duration>,
    }

    impl Respond for RangeResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let range = request
                .headers
                .get("range")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| parse_range(value, self.body.len()));

            match range {
                Some((start, end)) if self.honor_ranges => {
                    let content_range = format!("bytes {}-{}/{}", start, end, self.body.len());
                    let response = ResponseTemplate::new(206)
                        .insert_header("content-range", content_range.as_str())
                        .set_body_bytes(self.body[start..=end].to_vec());
                    match self.stall {
                        Some(stall) if start > 0 => response.set_delay(stall),
                        _ => response,
                    }
                }
                _ => ResponseTemplate::new(200).set_body_bytes(self.body.to_vec()),
            }
        }
    }

    fn parse_range(value: &str, len: usize) -> Option<(usize, usize)> {
        let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
        let start: usize = start.parse().ok()?;
        let end = end.parse::<usize>().ok()?.min(len.checked_sub(1)?);
        (start <= end).then_some((start, end))
    }

    /// One object served at [`url`](RangeServer::url).
    pub struct RangeServer {
        server: MockServer,
    }

    impl RangeServer {
        pub async fn start(body: Vec<u8>) -> Self {
            Self::start_with(body, true, None).await
        }

        /// Server that answers every GET with the whole object and 200.
        pub async fn start_ignoring_ranges(body: Vec<u8>) -> Self {
            Self::start_with(body, false, None).await
        }

        /// Server where only the first range answers promptly.
        pub async fn start_with_stall(body: Vec<u8>, stall: Duration) -> Self {
            Self::start_with(body, true, Some(stall)).await
        }

        async fn start_with(body: Vec<u8>, honor_ranges: bool, stall: Option<Duration>) -> Self {
            let server = MockServer::start().await;
            let len = body.len();
            let body = Arc::new(body);

            Mock::given(method("HEAD"))
                .and(path(OBJECT_PATH))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-length", len.to_string().as_str())
                        .set_body_bytes(body.to_vec()),
                )
                .mount(&server)
                .await;

            Mock::given(method("GET"))
                .and(path(OBJECT_PATH))
                .respond_with(RangeResponder { body, honor_ranges, stall })
                .mount(&server)
                .await;

            Self { server }
        }

        /// Answer the next `n` size queries with 503.
        pub async fn fail_next_size_queries(&self, n: u64) {
            Mock::given(method("HEAD"))
                .and(path(OBJECT_PATH))
                .respond_with(ResponseTemplate::new(503))
                .up_to_n_times(n)
                .with_priority(1)
                .mount(&self.server)
                .await;
        }

        pub fn base_url(&self) -> String {
            self.server.uri()
        }

        /// URL of the served object.
        pub fn url(&self) -> String {
            format!("{}{}", self.server.uri(), OBJECT_PATH)
        }

        /// URL of the served object with a query string, like a signed URL.
        pub fn url_with_query(&self, query: &str) -> String {
            format!("{}?{}", self.url(), query)
        }

        /// Number of GET requests received so far.
        pub async fn range_requests(&self) -> usize {
            self.server
                .received_requests()
                .await
                .unwrap_or_default()
                .iter()
                .filter(|request| request.method.as_str() == "GET")
                .count()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Message;

    #[test]
    fn builder_counts_and_frames_messages() {
        let log = LogBuilder::new()
            .event(EventKind::CAN, 1)
            .hevc_frame(EventKind::ROAD_ENCODE_IDX, 2, 3, 4)
            .controls_state(5, sample_controls_state());
        assert_eq!(log.len(), 3);

        let bytes = log.build();
        let mut offset = 0;
        let mut messages = 0;
        while offset < bytes.len() {
            offset += Message::parse(&bytes[offset..]).unwrap().byte_len();
            messages += 1;
        }
        assert_eq!(messages, 3);
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn sample_log_has_requested_size() {
        let bytes = sample_log(100);
        let mut offset = 0;
        let mut messages = 0;
        while offset < bytes.len() {
            offset += Message::parse(&bytes[offset..]).unwrap().byte_len();
            messages += 1;
        }
        assert_eq!(messages, 100);
    }
}
