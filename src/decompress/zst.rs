//! Zstandard frame codec

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zstd::stream::raw::{Decoder, InBuffer, Operation, OutBuffer};
use zstd::zstd_safe::{self, DCtx};

use super::Codec;
use crate::{LogError, Result};

/// Reservation multiple used when the frame does not declare its content size.
const FALLBACK_EXPANSION: usize = 2;

/// Upper bound on the up-front reservation, as a multiple of the input size.
/// The declared size comes from untrusted header bytes.
const MAX_RESERVE_EXPANSION: usize = 64;

/// Decompress one or more concatenated zstd frames.
///
/// The declared frame content size, when present, is used to reserve the output.
/// Any error reported by the decoder fails the whole call, and so does input that
/// ends before the final frame is complete.
pub fn decompress_zstd(input: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let mut decoder = Decoder::new().map_err(|e| LogError::corrupt(Codec::Zstd, e.to_string()))?;

    let reserve = match zstd_safe::get_frame_content_size(input) {
        Ok(Some(size)) => usize::try_from(size)
            .unwrap_or(usize::MAX)
            .min(input.len().saturating_mul(MAX_RESERVE_EXPANSION)),
        _ => input.len().saturating_mul(FALLBACK_EXPANSION),
    };
    let mut decompressed = Vec::with_capacity(reserve);

    let mut chunk = vec![0u8; DCtx::out_size()];
    let mut in_buf = InBuffer::around(input);
    let remaining = loop {
        if cancel.is_cancelled() {
            debug!("zstd decompression aborted after {} bytes", decompressed.len());
            return Err(LogError::Aborted);
        }

        let mut out_buf = OutBuffer::around(&mut chunk[..]);
        let hint = decoder.run(&mut in_buf, &mut out_buf).map_err(|e| {
            warn!("decompressZST error: content is corrupt ({})", e);
            LogError::corrupt(Codec::Zstd, e.to_string())
        })?;
        let written = out_buf.pos();
        decompressed.extend_from_slice(&chunk[..written]);

        // A partially filled chunk means the decoder has nothing buffered
        if in_buf.pos() == input.len() && written < chunk.len() {
            break hint;
        }
    };

    if remaining != 0 {
        warn!("decompressZST error: stream ends inside a frame");
        return Err(LogError::corrupt(
            Codec::Zstd,
            format!("truncated frame, decoder expects {} more bytes", remaining),
        ));
    }

    decompressed.shrink_to_fit();
    debug!("zstd: {} -> {} bytes", input.len(), decompressed.len());
    Ok(decompressed)
}
