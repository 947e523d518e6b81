//! bzip2 block codec

use bzip2::{Decompress, Status};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Codec;
use crate::{LogError, Result};

/// Initial output size as a multiple of the compressed size.
const INITIAL_EXPANSION: usize = 5;

/// Decompress a complete bzip2 stream.
///
/// The output buffer starts at five times the input size and doubles whenever a
/// decode call fills it. A call that reports success without producing output
/// while output space is available means the stream stopped making progress and
/// is treated as corruption.
pub fn decompress_bz2(input: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let mut stream = Decompress::new(false);
    let mut out = vec![0u8; input.len().saturating_mul(INITIAL_EXPANSION)];

    loop {
        if cancel.is_cancelled() {
            debug!("bzip2 decompression aborted after {} bytes", stream.total_out());
            return Err(LogError::Aborted);
        }

        let in_pos = stream.total_in() as usize;
        let out_pos = stream.total_out() as usize;

        let status = stream.decompress(&input[in_pos..], &mut out[out_pos..]).map_err(|e| {
            warn!("decompressBZ2 error: {}", e);
            LogError::corrupt(Codec::Bzip2, e.to_string())
        })?;

        if status == Status::StreamEnd {
            break;
        }

        let produced = stream.total_out() as usize - out_pos;
        if produced == 0 && out_pos < out.len() {
            warn!("decompressBZ2 error: content is corrupt");
            return Err(LogError::corrupt(
                Codec::Bzip2,
                format!("no progress at input offset {}", stream.total_in()),
            ));
        }

        if stream.total_out() as usize == out.len() {
            out.resize(out.len() * 2, 0);
        }
    }

    out.truncate(stream.total_out() as usize);
    out.shrink_to_fit();
    debug!("bzip2: {} -> {} bytes", input.len(), out.len());
    Ok(out)
}
