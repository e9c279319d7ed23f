//! Canonical serialization, compression and digests for sync packages.
//!
//! A package is hashed twice: once over its canonical JSON (stable across
//! re-serialization, so an importer can recompute it after parsing) and once
//! over the gzip bytes (checkable without decompressing).

use base64::{engine::general_purpose::STANDARD, Engine};
use examsync_types::SyncPackage;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};

use crate::error::{SyncError, SyncResult};

/// Fixed-size gzip member header (RFC 1952 section 2.3).
const GZIP_HEADER_LEN: usize = 10;

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}

/// The three artefacts produced when a package is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPackage {
    /// gzip(canonical JSON).
    pub bytes: Vec<u8>,
    /// SHA-256 hex of the canonical JSON.
    pub digest_json: String,
    /// SHA-256 hex of `bytes`.
    pub digest_compressed: String,
}

/// Stateless codec for packages and blobs.
pub struct IntegrityCodec;

impl IntegrityCodec {
    /// Serializes a value with sorted object keys and no whitespace.
    pub fn canonical_json(value: &Value) -> SyncResult<Vec<u8>> {
        let mut out = String::new();
        write_canonical(value, &mut out)?;
        Ok(out.into_bytes())
    }

    /// Digest of the canonical form of `value`.
    pub fn digest_value(value: &Value) -> SyncResult<String> {
        Ok(sha256_hex(&Self::canonical_json(value)?))
    }

    /// Encodes a package into compressed bytes plus both digests.
    pub fn encode(package: &SyncPackage) -> SyncResult<EncodedPackage> {
        let value = serde_json::to_value(package)?;
        let canonical = Self::canonical_json(&value)?;
        let bytes = Self::compress(&canonical)?;
        Ok(EncodedPackage {
            digest_json: sha256_hex(&canonical),
            digest_compressed: sha256_hex(&bytes),
            bytes,
        })
    }

    /// Decompresses at most `max_decompressed` bytes and parses them as JSON.
    ///
    /// Fails with `SizeExceeded` past the ceiling and `Malformed` when the
    /// bytes are not gzip or not JSON. The gzip header must be the one
    /// [`IntegrityCodec::compress`] writes, since its mtime, flags and OS
    /// bytes are outside the gzip CRC.
    pub fn decode(bytes: &[u8], max_decompressed: u64) -> SyncResult<Value> {
        Self::check_header(bytes)?;
        let raw = Self::decompress(bytes, max_decompressed)?;
        serde_json::from_slice(&raw)
            .map_err(|e| SyncError::Malformed(format!("payload is not JSON: {e}")))
    }

    /// gzip-compresses `bytes`.
    pub fn compress(bytes: &[u8]) -> SyncResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes)?;
        Ok(encoder.finish()?)
    }

    fn check_header(bytes: &[u8]) -> SyncResult<()> {
        let reference = Self::compress(&[])?;
        let expected = reference.get(..GZIP_HEADER_LEN);
        match bytes.get(..GZIP_HEADER_LEN) {
            Some(header) if Some(header) == expected => Ok(()),
            Some(header) => Err(SyncError::Malformed(format!(
                "unexpected gzip header {}",
                hex::encode(header)
            ))),
            None => Err(SyncError::Malformed("payload is shorter than a gzip header".to_string())),
        }
    }

    /// Decompresses gzip `bytes`, refusing output larger than `limit`.
    pub fn decompress(bytes: &[u8], limit: u64) -> SyncResult<Vec<u8>> {
        let mut out = Vec::new();
        GzDecoder::new(bytes)
            .take(limit.saturating_add(1))
            .read_to_end(&mut out)
            .map_err(|e| SyncError::Malformed(format!("payload is not valid gzip: {e}")))?;

        let actual = out.len() as u64;
        if actual > limit {
            return Err(SyncError::SizeExceeded { limit, actual });
        }
        Ok(out)
    }

    /// Compresses a PDF for embedding in a package.
    pub fn compress_blob(bytes: &[u8]) -> SyncResult<Vec<u8>> {
        Self::compress(bytes)
    }

    /// Decompresses an embedded PDF.
    pub fn decompress_blob(bytes: &[u8], limit: u64) -> SyncResult<Vec<u8>> {
        Self::decompress(bytes, limit)
    }

    /// Hash recorded in `PdfAsset::content_hash` for decompressed blob bytes.
    #[must_use]
    pub fn content_hash(bytes: &[u8]) -> String {
        sha256_hex(bytes)
    }

    /// Whether two hex digests are equal, ignoring case and surrounding space.
    #[must_use]
    pub fn digests_match(expected: &str, actual: &str) -> bool {
        expected.trim().eq_ignore_ascii_case(actual.trim())
    }

    /// Checks compressed bytes against `digest_compressed`.
    #[must_use]
    pub fn verify_compressed(bytes: &[u8], digest: &str) -> bool {
        Self::digests_match(digest, &sha256_hex(bytes))
    }

    /// Base64 for callers that move packages as text.
    #[must_use]
    pub fn to_transport(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    /// Inverse of [`IntegrityCodec::to_transport`].
    pub fn from_transport(text: &str) -> SyncResult<Vec<u8>> {
        STANDARD
            .decode(text.trim())
            .map_err(|e| SyncError::Malformed(format!("payload is not base64: {e}")))
    }
}

fn write_canonical(value: &Value, out: &mut String) -> SyncResult<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[*key], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}
