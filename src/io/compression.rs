//! Compression codecs shared by the Parquet and IPC writers.
//! - Zstd via the `zstd` crate (feature `zstd`).
//! - LZ4 via `lz4_flex` (feature `lz4`): raw blocks for Parquet `LZ4_RAW`,
//!   the frame format for IPC body buffers.
//! - Snappy via the `snappy` crate (feature `snappy`).
//!
//! Selecting a codec whose feature is disabled fails with
//! [`InterchangeError::Compression`] at write or read time.

use std::fmt::{Display, Formatter};

use crate::enums::error::{InterchangeError, Result};

/// Supported compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    None,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    /// True when the codec is compiled in.
    pub fn is_available(self) -> bool {
        match self {
            Compression::None => true,
            Compression::Snappy => cfg!(feature = "snappy"),
            Compression::Lz4 => cfg!(feature = "lz4"),
            Compression::Zstd => cfg!(feature = "zstd"),
        }
    }

    /// Parquet `CompressionCodec` id. LZ4 is written as `LZ4_RAW`.
    pub(crate) fn parquet_codec(self) -> i32 {
        match self {
            Compression::None => 0,
            Compression::Snappy => 1,
            Compression::Zstd => 6,
            Compression::Lz4 => 7,
        }
    }

    pub(crate) fn from_parquet_codec(id: i32) -> Result<Self> {
        match id {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Snappy),
            6 => Ok(Compression::Zstd),
            7 => Ok(Compression::Lz4),
            other => Err(InterchangeError::Compression(format!(
                "unsupported parquet codec id {other}"
            ))),
        }
    }
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Compression::None => "UNCOMPRESSED",
            Compression::Snappy => "SNAPPY",
            Compression::Lz4 => "LZ4_RAW",
            Compression::Zstd => "ZSTD",
        };
        f.write_str(name)
    }
}

/// Compresses `input` with `codec`, always returning a new buffer.
///
/// # Errors
/// Returns [`InterchangeError::Compression`] if the codec fails or is not enabled.
pub fn compress(input: &[u8], codec: Compression) -> Result<Vec<u8>> {
    match codec {
        Compression::None => Ok(input.to_vec()),
        Compression::Snappy => snappy_compress(input),
        Compression::Lz4 => lz4_compress(input),
        Compression::Zstd => zstd_compress(input),
    }
}

/// Decompresses `input` produced by `codec`.
///
/// `uncompressed_len` is the size recorded next to the payload. Block codecs need
/// it; the result is checked against it for every codec.
pub fn decompress(input: &[u8], codec: Compression, uncompressed_len: usize) -> Result<Vec<u8>> {
    let out = match codec {
        Compression::None => input.to_vec(),
        Compression::Snappy => snappy_decompress(input)?,
        Compression::Lz4 => lz4_decompress(input, uncompressed_len)?,
        Compression::Zstd => zstd_decompress(input)?,
    };
    if out.len() != uncompressed_len {
        return Err(InterchangeError::Compression(format!(
            "{codec} payload decompressed to {} bytes, expected {uncompressed_len}",
            out.len()
        )));
    }
    Ok(out)
}

/// Compresses one IPC body buffer. LZ4 is framed there, as `LZ4_FRAME` requires.
pub(crate) fn compress_ipc(input: &[u8], codec: Compression) -> Result<Vec<u8>> {
    match codec {
        Compression::Lz4 => lz4_frame_compress(input),
        other => compress(input, other),
    }
}

/// Inverse of [`compress_ipc`].
pub(crate) fn decompress_ipc(
    input: &[u8],
    codec: Compression,
    uncompressed_len: usize,
) -> Result<Vec<u8>> {
    match codec {
        Compression::Lz4 => {
            let out = lz4_frame_decompress(input, uncompressed_len)?;
            if out.len() != uncompressed_len {
                return Err(InterchangeError::Compression(format!(
                    "LZ4_FRAME payload decompressed to {} bytes, expected {uncompressed_len}",
                    out.len()
                )));
            }
            Ok(out)
        }
        other => decompress(input, other, uncompressed_len),
    }
}

fn not_enabled(codec: Compression) -> InterchangeError {
    InterchangeError::Compression(format!("{codec} support is not enabled"))
}

#[cfg(feature = "zstd")]
fn zstd_compress(input: &[u8]) -> Result<Vec<u8>> {
    // Level 1 is fastest, with good compression.
    zstd::stream::encode_all(input, 1)
        .map_err(|e| InterchangeError::Compression(format!("zstd compression failed: {e}")))
}

#[cfg(not(feature = "zstd"))]
fn zstd_compress(_input: &[u8]) -> Result<Vec<u8>> {
    Err(not_enabled(Compression::Zstd))
}

#[cfg(feature = "zstd")]
fn zstd_decompress(input: &[u8]) -> Result<Vec<u8>> {
    zstd::stream::decode_all(input)
        .map_err(|e| InterchangeError::Compression(format!("zstd decompression failed: {e}")))
}

#[cfg(not(feature = "zstd"))]
fn zstd_decompress(_input: &[u8]) -> Result<Vec<u8>> {
    Err(not_enabled(Compression::Zstd))
}

#[cfg(feature = "lz4")]
fn lz4_compress(input: &[u8]) -> Result<Vec<u8>> {
    Ok(lz4_flex::block::compress(input))
}

#[cfg(not(feature = "lz4"))]
fn lz4_compress(_input: &[u8]) -> Result<Vec<u8>> {
    Err(not_enabled(Compression::Lz4))
}

#[cfg(feature = "lz4")]
fn lz4_decompress(input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
    lz4_flex::block::decompress(input, uncompressed_len)
        .map_err(|e| InterchangeError::Compression(format!("lz4 decompression failed: {e}")))
}

#[cfg(not(feature = "lz4"))]
fn lz4_decompress(_input: &[u8], _uncompressed_len: usize) -> Result<Vec<u8>> {
    Err(not_enabled(Compression::Lz4))
}

#[cfg(feature = "lz4")]
fn lz4_frame_compress(input: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;
    let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::with_capacity(input.len() / 2));
    encoder
        .write_all(input)
        .map_err(|e| InterchangeError::Compression(format!("lz4 frame compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| InterchangeError::Compression(format!("lz4 frame compression failed: {e}")))
}

#[cfg(not(feature = "lz4"))]
fn lz4_frame_compress(_input: &[u8]) -> Result<Vec<u8>> {
    Err(not_enabled(Compression::Lz4))
}

#[cfg(feature = "lz4")]
fn lz4_frame_decompress(input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
    use std::io::Read;
    let mut out = Vec::with_capacity(uncompressed_len.min(input.len().saturating_mul(255)));
    lz4_flex::frame::FrameDecoder::new(input)
        .read_to_end(&mut out)
        .map_err(|e| InterchangeError::Compression(format!("lz4 frame decompression failed: {e}")))?;
    Ok(out)
}

#[cfg(not(feature = "lz4"))]
fn lz4_frame_decompress(_input: &[u8], _uncompressed_len: usize) -> Result<Vec<u8>> {
    Err(not_enabled(Compression::Lz4))
}

#[cfg(feature = "snappy")]
fn snappy_compress(input: &[u8]) -> Result<Vec<u8>> {
    Ok(snappy::compress(input))
}

#[cfg(not(feature = "snappy"))]
fn snappy_compress(_input: &[u8]) -> Result<Vec<u8>> {
    Err(not_enabled(Compression::Snappy))
}

#[cfg(feature = "snappy")]
fn snappy_decompress(input: &[u8]) -> Result<Vec<u8>> {
    snappy::uncompress(input)
        .ok_or_else(|| InterchangeError::Compression("snappy decompression failed".into()))
}

#[cfg(not(feature = "snappy"))]
fn snappy_decompress(_input: &[u8]) -> Result<Vec<u8>> {
    Err(not_enabled(Compression::Snappy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0..4096u32).flat_map(|i| (i % 17).to_le_bytes()).collect()
    }

    #[test]
    fn none_is_identity() {
        let data = sample();
        assert_eq!(compress(&data, Compression::None).unwrap(), data);
        assert_eq!(decompress(&data, Compression::None, data.len()).unwrap(), data);
        assert!(decompress(&data, Compression::None, 3).is_err());
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn zstd_shrinks_repetitive_data() {
        let data = sample();
        let packed = compress(&data, Compression::Zstd).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed, Compression::Zstd, data.len()).unwrap(), data);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn lz4_needs_the_recorded_length() {
        let data = sample();
        let packed = compress(&data, Compression::Lz4).unwrap();
        assert_eq!(decompress(&packed, Compression::Lz4, data.len()).unwrap(), data);
        assert!(decompress(&packed, Compression::Lz4, data.len() - 1).is_err());
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn ipc_lz4_is_framed() {
        let data = sample();
        let framed = compress_ipc(&data, Compression::Lz4).unwrap();
        // LZ4 frame magic number.
        assert_eq!(&framed[..4], &[0x04, 0x22, 0x4D, 0x18]);
        assert_eq!(decompress_ipc(&framed, Compression::Lz4, data.len()).unwrap(), data);
        assert!(decompress_ipc(&framed, Compression::Lz4, data.len() + 1).is_err());
    }

    #[cfg(not(feature = "snappy"))]
    #[test]
    fn disabled_codec_reports_compression_error() {
        assert!(!Compression::Snappy.is_available());
        let err = compress(b"abc", Compression::Snappy).unwrap_err();
        assert!(matches!(err, InterchangeError::Compression(_)));
    }

    #[test]
    fn parquet_codec_ids() {
        for c in [Compression::None, Compression::Snappy, Compression::Lz4, Compression::Zstd] {
            assert_eq!(Compression::from_parquet_codec(c.parquet_codec()).unwrap(), c);
        }
        assert!(Compression::from_parquet_codec(2).is_err());
    }
}
