//! Compressed-container unwrapping for note and table blobs.
//!
//! Blobs are stored as gzip members. The header is parsed here rather than by
//! a streaming gzip reader so that each optional header part can be skipped
//! explicitly and the deflate payload bounded by the fixed-size trailer.

use crate::core::error::InflateError;
use flate2::read::DeflateDecoder;
use flate2::Crc;
use std::io::Read;

const MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
const FIXED_HEADER_LEN: usize = 10;
const TRAILER_LEN: usize = 8;

const FLAG_HCRC: u8 = 0x02;
const FLAG_EXTRA: u8 = 0x04;
const FLAG_NAME: u8 = 0x08;
const FLAG_COMMENT: u8 = 0x10;

/// Initial output capacity as a multiple of the compressed payload size.
const INITIAL_GROWTH: usize = 10;

/// Returns `true` if `bytes` start with the container signature.
pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == MAGIC
}

/// Strips the container header and trailer and inflates the enclosed stream.
///
/// # Errors
///
/// Returns [`InflateError::NotCompressed`] when the signature is absent and
/// [`InflateError::CorruptStream`] for any header or inflate failure, or when
/// the output disagrees with the trailer's checksum or length.
pub fn inflate(bytes: &[u8]) -> Result<Vec<u8>, InflateError> {
    if !is_compressed(bytes) {
        return Err(InflateError::NotCompressed);
    }
    let payload = deflate_payload(bytes)?;

    let mut out = Vec::with_capacity(payload.len().saturating_mul(INITIAL_GROWTH));
    DeflateDecoder::new(payload)
        .read_to_end(&mut out)
        .map_err(|e| InflateError::CorruptStream(e.to_string()))?;
    verify_trailer(&bytes[bytes.len() - TRAILER_LEN..], &out)?;
    Ok(out)
}

/// Checks the CRC32 and ISIZE (length mod 2^32) fields against `out`.
fn verify_trailer(trailer: &[u8], out: &[u8]) -> Result<(), InflateError> {
    let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let expected_len = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

    let mut crc = Crc::new();
    crc.update(out);
    if crc.sum() != expected_crc {
        return Err(corrupt("checksum mismatch"));
    }
    if out.len() as u32 != expected_len {
        return Err(corrupt("length mismatch"));
    }
    Ok(())
}

/// Locates the raw deflate bytes between the variable-length header and the trailer.
fn deflate_payload(bytes: &[u8]) -> Result<&[u8], InflateError> {
    if bytes.len() < FIXED_HEADER_LEN + TRAILER_LEN {
        return Err(corrupt("shorter than header and trailer"));
    }
    if bytes[2] != METHOD_DEFLATE {
        return Err(corrupt(format!("unknown compression method {}", bytes[2])));
    }
    let flags = bytes[3];
    let body_end = bytes.len() - TRAILER_LEN;
    let mut pos = FIXED_HEADER_LEN;

    if flags & FLAG_EXTRA != 0 {
        let len_bytes = bytes
            .get(pos..pos + 2)
            .ok_or_else(|| corrupt("truncated extra-field length"))?;
        let extra_len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
        pos += 2 + extra_len;
    }
    if flags & FLAG_NAME != 0 {
        pos = skip_zero_terminated(bytes, pos, body_end)
            .ok_or_else(|| corrupt("unterminated name"))?;
    }
    if flags & FLAG_COMMENT != 0 {
        pos = skip_zero_terminated(bytes, pos, body_end)
            .ok_or_else(|| corrupt("unterminated comment"))?;
    }
    if flags & FLAG_HCRC != 0 {
        pos += 2;
    }

    if pos > body_end {
        return Err(corrupt("header runs into trailer"));
    }
    Ok(&bytes[pos..body_end])
}

/// Returns the position just past the next zero byte at or after `pos`.
fn skip_zero_terminated(bytes: &[u8], pos: usize, limit: usize) -> Option<usize> {
    let window = bytes.get(pos..limit)?;
    window.iter().position(|&b| b == 0).map(|zero| pos + zero + 1)
}

fn corrupt(msg: impl Into<String>) -> InflateError {
    InflateError::CorruptStream(msg.into())
}
