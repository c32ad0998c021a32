//! Compression facade for spill pages and permutation blocks (feature-gated).
//!
//! Keep this tiny and synchronous. We only support `None`, `Zstd`, `Lz4`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Codec {
    None = 0,
    Zstd = 1,
    Lz4 = 2,
}

impl Codec {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Codec::None),
            1 => Ok(Codec::Zstd),
            2 => Ok(Codec::Lz4),
            other => Err(Error::CodecUnsupported(format!("tag {other}"))),
        }
    }

    /// Parse the config spelling (`none`, `zstd`, `lz4`). Codecs whose cargo
    /// feature is off are rejected here rather than at first use.
    pub fn parse(name: &str) -> Result<Self> {
        let codec = match name.to_ascii_lowercase().as_str() {
            "none" | "" => Codec::None,
            "zstd" => Codec::Zstd,
            "lz4" => Codec::Lz4,
            other => return Err(Error::CodecUnsupported(other.to_string())),
        };
        if !codec.is_available() {
            return Err(Error::CodecUnsupported(name.to_string()));
        }
        Ok(codec)
    }

    pub fn is_available(self) -> bool {
        match self {
            Codec::None => true,
            Codec::Zstd => cfg!(feature = "zstd"),
            Codec::Lz4 => cfg!(feature = "lz4"),
        }
    }
}

pub fn compress(codec: Codec, input: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Codec::None => Ok(input.to_vec()),
        Codec::Zstd => {
            #[cfg(feature = "zstd")]
            {
                // Level 1: blocks are written once and decompressed often.
                zstd::bulk::compress(input, 1).map_err(|e| Error::Codec(format!("zstd: {e}")))
            }
            #[cfg(not(feature = "zstd"))]
            {
                Err(Error::CodecUnsupported("zstd".into()))
            }
        }
        Codec::Lz4 => {
            #[cfg(feature = "lz4")]
            {
                Ok(lz4_flex::compress_prepend_size(input))
            }
            #[cfg(not(feature = "lz4"))]
            {
                Err(Error::CodecUnsupported("lz4".into()))
            }
        }
    }
}

/// `expected_len` is the uncompressed size recorded next to the payload.
pub fn decompress(codec: Codec, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let out = match codec {
        Codec::None => input.to_vec(),
        Codec::Zstd => {
            #[cfg(feature = "zstd")]
            {
                zstd::bulk::decompress(input, expected_len)
                    .map_err(|e| Error::Codec(format!("zstd: {e}")))?
            }
            #[cfg(not(feature = "zstd"))]
            {
                return Err(Error::CodecUnsupported("zstd".into()));
            }
        }
        Codec::Lz4 => {
            #[cfg(feature = "lz4")]
            {
                lz4_flex::decompress_size_prepended(input)
                    .map_err(|e| Error::Codec(format!("lz4: {e}")))?
            }
            #[cfg(not(feature = "lz4"))]
            {
                return Err(Error::CodecUnsupported("lz4".into()));
            }
        }
    };
    if out.len() != expected_len {
        return Err(Error::Codec(format!(
            "decompressed {} bytes, expected {}",
            out.len(),
            expected_len
        )));
    }
    Ok(out)
}
