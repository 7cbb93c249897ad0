//! Pluggable page compression. The storage layer never compresses pages
//! itself; it calls through a `PageCompressor` so that a real codec can be
//! swapped in without touching the disk manager or buffer pool.
//!
//! Mirrors the original engine's `compile-time optional` compression
//! module: compression is advisory (a compressor may decline and the
//! caller keeps the uncompressed bytes), and the default implementation is
//! a no-op.

use crate::error::{DbResult, Status};

/// A codec for whole pages. `compress` returns `None` when compression
/// would not help (output not smaller than input) or is unsupported;
/// callers fall back to storing the page uncompressed in that case.
pub trait PageCompressor: Send + Sync {
    fn compress(&self, src: &[u8]) -> Option<Vec<u8>>;
    fn decompress(&self, src: &[u8]) -> DbResult<Vec<u8>>;
    fn is_enabled(&self) -> bool;
}

/// Always declines to compress and returns its input unchanged on
/// decompress. The default `PageCompressor` for every `BufferPool`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCompressor;

impl PageCompressor for NoopCompressor {
    fn compress(&self, _src: &[u8]) -> Option<Vec<u8>> {
        None
    }

    fn decompress(&self, src: &[u8]) -> DbResult<Vec<u8>> {
        Ok(src.to_vec())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

const MAGIC: u32 = 0x4C5A_3447;
const HEADER_SIZE: usize = 16;

/// A minimal byte-run compressor for pages that are mostly zero-filled
/// (freshly allocated or sparsely populated slotted pages), grounded on
/// the original engine's `CompressionHeader` layout (magic, original
/// size, compressed size, checksum) without requiring an external codec
/// dependency. Declines whenever the run-length encoding does not shrink
/// the page.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunLengthCompressor;

impl RunLengthCompressor {
    fn checksum(data: &[u8]) -> u32 {
        let mut sum: u32 = 0;
        for &b in data {
            sum = sum.wrapping_mul(31).wrapping_add(b as u32);
        }
        sum
    }

    fn encode(src: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < src.len() {
            let byte = src[i];
            let mut run = 1usize;
            while i + run < src.len() && src[i + run] == byte && run < 255 {
                run += 1;
            }
            out.push(run as u8);
            out.push(byte);
            i += run;
        }
        out
    }

    fn decode(encoded: &[u8], original_size: usize) -> Option<Vec<u8>> {
        if encoded.len() % 2 != 0 {
            return None;
        }
        let mut out = Vec::with_capacity(original_size);
        for pair in encoded.chunks_exact(2) {
            let run = pair[0] as usize;
            let byte = pair[1];
            out.extend(std::iter::repeat(byte).take(run));
        }
        if out.len() == original_size {
            Some(out)
        } else {
            None
        }
    }
}

impl PageCompressor for RunLengthCompressor {
    fn compress(&self, src: &[u8]) -> Option<Vec<u8>> {
        let body = Self::encode(src);
        if body.len() + HEADER_SIZE >= src.len() {
            return None;
        }
        let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&(src.len() as u32).to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&Self::checksum(src).to_le_bytes());
        out.extend_from_slice(&body);
        Some(out)
    }

    fn decompress(&self, src: &[u8]) -> DbResult<Vec<u8>> {
        if src.len() < HEADER_SIZE {
            return Err(Status::corruption("compressed page shorter than header"));
        }
        let magic = u32::from_le_bytes(src[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(Status::corruption("bad compressed-page magic"));
        }
        let original_size = u32::from_le_bytes(src[4..8].try_into().unwrap()) as usize;
        let compressed_size = u32::from_le_bytes(src[8..12].try_into().unwrap()) as usize;
        let checksum = u32::from_le_bytes(src[12..16].try_into().unwrap());
        let body = src
            .get(HEADER_SIZE..HEADER_SIZE + compressed_size)
            .ok_or_else(|| Status::corruption("truncated compressed page body"))?;
        let out = Self::decode(body, original_size).ok_or_else(|| Status::corruption("malformed run-length body"))?;
        if Self::checksum(&out) != checksum {
            return Err(Status::corruption("compressed page checksum mismatch"));
        }
        Ok(out)
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_declines_and_round_trips_unchanged() {
        let c = NoopCompressor;
        assert!(!c.is_enabled());
        assert!(c.compress(&[1, 2, 3]).is_none());
        assert_eq!(c.decompress(&[1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn run_length_round_trips_compressible_page() {
        let c = RunLengthCompressor;
        let mut page = vec![0u8; 4096];
        page[0..8].copy_from_slice(b"deadbeef");
        let compressed = c.compress(&page).expect("mostly-zero page should compress");
        assert!(compressed.len() < page.len());
        let restored = c.decompress(&compressed).unwrap();
        assert_eq!(restored, page);
    }

    #[test]
    fn run_length_declines_incompressible_input() {
        let c = RunLengthCompressor;
        let noisy: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        assert!(c.compress(&noisy).is_none());
    }
}
