//! Versioned deterministic binary codec.
//!
//! Every encoding is a big-endian `u16` codec version followed by the
//! bincode body (fixed-width little-endian integers, `u64` length prefixes,
//! enum variants tagged by declaration index). Trailing bytes are rejected so
//! that decoding is the exact inverse of encoding.

use crate::{LedgerError, Result};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const CODEC_VERSION: u16 = 0;

const VERSION_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    version: u16,
}

impl Codec {
    pub fn new(version: u16) -> Self {
        Self { version }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    fn options() -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_little_endian()
            .reject_trailing_bytes()
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let body = Self::options().serialize(value)?;

        let mut bytes = Vec::with_capacity(VERSION_LEN + body.len());
        bytes.extend_from_slice(&self.version.to_be_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        if bytes.len() < VERSION_LEN {
            return Err(LedgerError::Codec("Missing codec version".to_string()));
        }

        let version = u16::from_be_bytes([bytes[0], bytes[1]]);
        if version != self.version {
            return Err(LedgerError::Codec(format!(
                "Unknown codec version {}, expected {}",
                version, self.version
            )));
        }

        Ok(Self::options().deserialize(&bytes[VERSION_LEN..])?)
    }

    /// Encoded length, computed without producing the bytes.
    pub fn size<T: Serialize + ?Sized>(&self, value: &T) -> Result<u64> {
        Ok(VERSION_LEN as u64 + Self::options().serialized_size(value)?)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(CODEC_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Shape {
        Empty,
        Pair(u32, Vec<u8>),
    }

    #[test]
    fn test_encode_decode() -> Result<()> {
        let codec = Codec::default();
        let value = Shape::Pair(7, vec![1, 2, 3]);

        let bytes = codec.encode(&value)?;
        assert_eq!(&bytes[0..2], &CODEC_VERSION.to_be_bytes());
        assert_eq!(codec.size(&value)?, bytes.len() as u64);
        assert_eq!(codec.decode::<Shape>(&bytes)?, value);
        Ok(())
    }

    #[test]
    fn test_variant_tag_is_stable() -> Result<()> {
        let bytes = Codec::default().encode(&Shape::Empty)?;
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_rejects_wrong_version_and_trailing_bytes() -> Result<()> {
        let codec = Codec::default();
        let mut bytes = codec.encode(&Shape::Pair(1, vec![]))?;

        assert!(Codec::new(1).decode::<Shape>(&bytes).is_err());

        bytes.push(0);
        assert!(codec.decode::<Shape>(&bytes).is_err());
        Ok(())
    }
}
