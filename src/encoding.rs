//! Content-encoding reversal on the read path
//!
//! Only `gzip` is actively decoded. Any other declared label is echoed back to
//! the client untouched, with the stored bytes passed through as-is.

use crate::error::{PasteError, Result};
use crate::models::GZIP_ENCODING;
use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use std::io::Read;
use tracing::debug;

/// How stored bytes must be transformed before delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDecoding {
    /// Serve stored bytes unchanged
    Passthrough,
    /// Gunzip stored bytes before serving
    Gunzip,
}

impl DeliveryDecoding {
    /// Pick the decoding for a stored encoding label
    ///
    /// Matching is exact: `GZIP` or `x-gzip` are passed through.
    pub fn for_label(content_encoding: &str) -> Self {
        if content_encoding == GZIP_ENCODING {
            DeliveryDecoding::Gunzip
        } else {
            DeliveryDecoding::Passthrough
        }
    }
}

/// Decompress a complete gzip stream
///
/// Concatenated gzip members are decoded as one stream. With a `limit`,
/// output beyond that many bytes fails the decode instead of being buffered.
pub fn gunzip(data: &[u8], limit: Option<u64>) -> Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(data);
    let mut decompressed = Vec::new();
    match limit {
        Some(limit) => {
            decoder
                .take(limit.saturating_add(1))
                .read_to_end(&mut decompressed)
                .map_err(|e| PasteError::Decompression(e.to_string()))?;
            if decompressed.len() as u64 > limit {
                return Err(PasteError::Decompression(format!(
                    "decompressed size exceeds limit of {} bytes",
                    limit
                )));
            }
        }
        None => {
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| PasteError::Decompression(e.to_string()))?;
        }
    }
    debug!("Decompressed {} bytes into {}", data.len(), decompressed.len());
    Ok(decompressed)
}

/// Produce the bytes to deliver for a stored encoding label
///
/// Decompression runs on the blocking pool so large payloads do not stall the
/// runtime.
pub async fn decode_for_delivery(
    content_encoding: &str,
    data: Bytes,
    limit: Option<u64>,
) -> Result<Bytes> {
    match DeliveryDecoding::for_label(content_encoding) {
        DeliveryDecoding::Passthrough => Ok(data),
        DeliveryDecoding::Gunzip => tokio::task::spawn_blocking(move || gunzip(&data, limit))
            .await
            .map_err(|e| PasteError::InternalError(format!("Decompression task failed: {}", e)))?
            .map(Bytes::from),
    }
}
