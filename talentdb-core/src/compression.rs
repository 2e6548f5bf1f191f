/*!
Compression seam for backup artifacts.

Gzip is the production choice; the passthrough variant exists for callers that
want uncompressed artifacts and for tests.
*/

use crate::{Result, TalentError};
use flate2::{read::GzDecoder, write::GzEncoder, Compression as GzLevel};
use std::io::{Read, Write};

/// Compression abstraction for backup payloads
pub trait Compression {
    /// Compress the input data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress the input data
    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of the compression algorithm
    fn algorithm_name(&self) -> &str;
}

/// Gzip compression
#[derive(Debug, Clone)]
pub struct Gzip {
    level: GzLevel,
}

impl Gzip {
    /// Default compression level (6)
    pub fn new() -> Self {
        Self {
            level: GzLevel::default(),
        }
    }

    /// Specific compression level (0-9)
    pub fn with_level(level: u32) -> Self {
        Self {
            level: GzLevel::new(level),
        }
    }

    /// Fast compression (level 1)
    pub fn fast() -> Self {
        Self::with_level(1)
    }

    /// Maximum compression (level 9)
    pub fn max() -> Self {
        Self::with_level(9)
    }
}

impl Default for Gzip {
    fn default() -> Self {
        Self::new()
    }
}

impl Compression for Gzip {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);

        encoder.write_all(data).map_err(|e| {
            TalentError::compression(format!("Failed to write data for compression: {e}"))
        })?;

        encoder
            .finish()
            .map_err(|e| TalentError::compression(format!("Failed to finish compression: {e}")))
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed_data);
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| TalentError::compression(format!("Failed to decompress data: {e}")))?;

        Ok(decompressed)
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Pass data through unchanged
#[derive(Debug, Clone)]
pub struct Passthrough;

impl Passthrough {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Passthrough {
    fn default() -> Self {
        Self::new()
    }
}

impl Compression for Passthrough {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed_data.to_vec())
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_roundtrip() {
        let compressor = Gzip::new();
        let original = b"SQLite page data tends to repeat. ".repeat(64);

        let compressed = compressor.compress(&original).unwrap();
        assert!(compressed.len() < original.len());

        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(original, decompressed);
    }

    #[test]
    fn gzip_levels_all_roundtrip() {
        let data = b"some database bytes to squeeze down".repeat(20);

        for compressor in [Gzip::fast(), Gzip::new(), Gzip::max()] {
            let compressed = compressor.compress(&data).unwrap();
            assert_eq!(compressor.decompress(&compressed).unwrap(), data);
        }
    }

    #[test]
    fn gzip_rejects_garbage() {
        let compressor = Gzip::new();
        assert!(compressor.decompress(b"this is not gzip data").is_err());
    }

    #[test]
    fn passthrough_is_identity() {
        let compressor = Passthrough::new();
        let data = b"raw";
        assert_eq!(compressor.compress(data).unwrap(), data);
        assert_eq!(compressor.decompress(data).unwrap(), data);
        assert_eq!(compressor.algorithm_name(), "none");
    }
}
