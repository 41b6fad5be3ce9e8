//! Order-data framing (`spec.md` §4.3): zlib-deflate, then (at the
//! session layer) E002 encryption, then base64, then a split into segments
//! no larger than the bank's advertised chunk size (at most 1 MiB).

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use super::error::EbicsError;

pub const MAX_SEGMENT_BYTES: usize = 1024 * 1024;

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("writing to an in-memory encoder never fails");
    encoder.finish().expect("finishing an in-memory encoder never fails")
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>, EbicsError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| EbicsError::Protocol(format!("invalid deflate order data: {e}")))?;
    Ok(out)
}

/// Base64-encodes `data`, then splits it into chunks of at most
/// `max_segment_bytes`, one per EBICS transfer segment.
pub fn chunk_base64(data: &[u8], max_segment_bytes: usize) -> Vec<String> {
    let encoded = B64.encode(data);
    if encoded.is_empty() {
        return vec![String::new()];
    }
    encoded
        .as_bytes()
        .chunks(max_segment_bytes)
        .map(|c| String::from_utf8(c.to_vec()).expect("base64 alphabet is ASCII"))
        .collect()
}

/// Inverse of [`chunk_base64`]: joins segments in order, then base64-decodes.
pub fn join_base64(segments: &[String]) -> Result<Vec<u8>, EbicsError> {
    let joined: String = segments.concat();
    B64.decode(joined.as_bytes())
        .map_err(|e| EbicsError::Protocol(format!("invalid base64 order data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_inflate_round_trip() {
        let original = b"<Document>some order data repeated many times</Document>".repeat(100);
        let compressed = deflate(&original);
        assert!(compressed.len() < original.len());
        assert_eq!(inflate(&compressed).unwrap(), original);
    }

    #[test]
    fn chunk_base64_round_trips() {
        let original = vec![0xABu8; 10_000];
        let segments = chunk_base64(&original, 100);
        assert!(segments.len() > 1);
        for seg in &segments {
            assert!(seg.len() <= 100);
        }
        assert_eq!(join_base64(&segments).unwrap(), original);
    }

    #[test]
    fn empty_payload_round_trips() {
        let segments = chunk_base64(b"", MAX_SEGMENT_BYTES);
        assert_eq!(join_base64(&segments).unwrap(), Vec::<u8>::new());
    }
}
