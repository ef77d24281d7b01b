//! Transparent decompression of partition payloads.
//!
//! Partitions are often stored compressed. Before parsing, the merge writer
//! runs each payload through [`decode_partition`], which picks a codec from the
//! partition name's extension (fast path) or the payload's magic bytes
//! (fallback) and returns the decoded bytes. Payloads that match no codec are
//! returned untouched.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags:
//! - **Gzip** (`.gz`) - via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` (feature: `compression-xz`)
//!
//! ## Custom Codecs
//! ```
//! use streammerge::io::compression::{decode_partition_with, CompressionCodec};
//! use std::io::Read;
//!
//! struct Identity;
//!
//! impl CompressionCodec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn extensions(&self) -> &[&str] { &[".id"] }
//!     fn magic_bytes(&self) -> Option<&[u8]> { None }
//!     fn wrap_reader_dyn<'a>(&self, r: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
//!         Ok(r)
//!     }
//! }
//!
//! let out = decode_partition_with(&[&Identity], b"a,b\n".to_vec(), "part.csv.id").unwrap();
//! assert_eq!(out, b"a,b\n");
//! ```

use std::io::Read;

/// Pluggable decompression codec.
///
/// Codecs are detected via name extensions (fast path) or magic bytes (fallback).
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// Extensions associated with this codec (e.g., `&[".gz", ".gzip"]`).
    ///
    /// Extensions include the leading dot and are lowercase.
    fn extensions(&self) -> &[&str];

    /// Optional magic byte signature for content-based detection.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>>;
}

/// The codecs compiled into this build.
#[must_use]
#[allow(unused_mut)]
pub fn builtin_codecs() -> Vec<&'static dyn CompressionCodec> {
    let mut codecs: Vec<&'static dyn CompressionCodec> = Vec::new();
    #[cfg(feature = "compression-gzip")]
    codecs.push(&GzipCodec);
    #[cfg(feature = "compression-zstd")]
    codecs.push(&ZstdCodec);
    #[cfg(feature = "compression-bzip2")]
    codecs.push(&Bzip2Codec);
    #[cfg(feature = "compression-xz")]
    codecs.push(&XzCodec);
    codecs
}

fn detect<'c>(
    codecs: &[&'c dyn CompressionCodec],
    raw: &[u8],
    name_hint: &str,
) -> Option<&'c dyn CompressionCodec> {
    let name = name_hint.to_lowercase();
    codecs
        .iter()
        .find(|codec| codec.extensions().iter().any(|ext| name.ends_with(ext)))
        .or_else(|| {
            codecs.iter().find(|codec| {
                codec
                    .magic_bytes()
                    .is_some_and(|magic| raw.starts_with(magic))
            })
        })
        .copied()
}

/// Decode `raw` with whichever built-in codec matches, or return it as-is.
///
/// # Errors
///
/// Returns an error if a codec matched but the payload fails to decode.
pub fn decode_partition(raw: Vec<u8>, name_hint: &str) -> std::io::Result<Vec<u8>> {
    decode_partition_with(&builtin_codecs(), raw, name_hint)
}

/// Like [`decode_partition`], with an explicit codec list.
///
/// # Errors
///
/// Returns an error if a codec matched but the payload fails to decode.
pub fn decode_partition_with(
    codecs: &[&dyn CompressionCodec],
    raw: Vec<u8>,
    name_hint: &str,
) -> std::io::Result<Vec<u8>> {
    let Some(codec) = detect(codecs, &raw, name_hint) else {
        return Ok(raw);
    };
    tracing::trace!(codec = codec.name(), partition = name_hint, "decoding partition");
    let mut reader = codec.wrap_reader_dyn(Box::new(raw.as_slice()))?;
    let mut out = Vec::with_capacity(raw.len().saturating_mul(4));
    reader.read_to_end(&mut out).map_err(|e| {
        std::io::Error::new(e.kind(), format!("{} decode failed: {e}", codec.name()))
    })?;
    Ok(out)
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read + 'a>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        // "BZh"; the bare "BZ" prefix collides with ordinary header text
        Some(&[0x42, 0x5a, 0x68])
    }

    fn wrap_reader_dyn<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
        use bzip2::read::BzDecoder;
        Ok(Box::new(BzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader_dyn<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
        use xz2::read::XzDecoder;
        Ok(Box::new(XzDecoder::new(reader)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_payload_passes_through() {
        let raw = b"id,name\n1,Ann\n".to_vec();
        assert_eq!(decode_partition(raw.clone(), "part1.csv").unwrap(), raw);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_detected_by_magic_without_extension() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"id,name\n2,Bo\n").unwrap();
        let packed = enc.finish().unwrap();

        let out = decode_partition(packed, "part2").unwrap();
        assert_eq!(out, b"id,name\n2,Bo\n");
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn zstd_detected_by_extension() {
        let packed = zstd::stream::encode_all(&b"a,b\n1,2\n"[..], 3).unwrap();
        let out = decode_partition(packed, "part.CSV.ZST").unwrap();
        assert_eq!(out, b"a,b\n1,2\n");
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn corrupt_payload_with_extension_fails() {
        assert!(decode_partition(b"not gzip".to_vec(), "part.gz").is_err());
    }
}
