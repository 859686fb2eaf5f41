//! FlateDecode (zlib/deflate) decoder.

use super::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// FlateDecode filter implementation.
///
/// Falls back to a raw deflate stream when the zlib header is missing, and
/// keeps partially decoded output when a stream is truncated.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => return Ok(output),
            Err(e) if !output.is_empty() => {
                log::warn!("FlateDecode: truncated stream, keeping {} bytes ({})", output.len(), e);
                return Ok(output);
            },
            Err(e) => log::debug!("FlateDecode: zlib failed ({}), trying raw deflate", e),
        }

        let mut output = Vec::new();
        DeflateDecoder::new(input)
            .read_to_end(&mut output)
            .map_err(|e| Error::MalformedDocument(format!("FlateDecode failed: {}", e)))?;
        Ok(output)
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}
