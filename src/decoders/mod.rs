//! Stream decoders for the filters a signing update has to read through.
//!
//! Cross-reference streams and object streams (PDF 1.5+) are almost always
//! FlateDecode-compressed, usually with a PNG predictor. Those are the only
//! filters handled here; any other filter is reported as unsupported.

use crate::error::{Error, Result};

mod flate;
mod predictor;

pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Upper bound on decoded stream size (decompression bomb protection).
const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Name of the filter this decoder implements (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Decode stream data through a filter pipeline, applying predictor
/// parameters after the filter that carries them.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder: Box<dyn StreamDecoder> = match filter_name.as_str() {
            "FlateDecode" | "Fl" => Box::new(FlateDecoder),
            other => {
                return Err(Error::UnsupportedFeature(format!("stream filter /{}", other)));
            },
        };

        current = decoder.decode(&current)?;
        if current.len() > MAX_DECOMPRESSED_SIZE {
            return Err(Error::MalformedDocument(format!(
                "{} output exceeds {} bytes",
                decoder.name(),
                MAX_DECOMPRESSED_SIZE
            )));
        }

        if let Some(params) = params {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_decode_stream_no_filters() {
        let decoded = decode_stream_with_params(b"raw", &[], None).unwrap();
        assert_eq!(decoded, b"raw");
    }

    #[test]
    fn test_decode_stream_unsupported_filter() {
        let err = decode_stream_with_params(b"data", &["LZWDecode".to_string()], None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
    }

    #[test]
    fn test_flate_with_png_up_predictor() {
        // Two rows of 3 columns, PNG Up: second row is the difference from the first.
        let encoded = [2u8, 1, 2, 3, 2, 1, 1, 1];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&encoded).unwrap();
        let compressed = encoder.finish().unwrap();

        let params = DecodeParams {
            predictor: 12,
            columns: 3,
            ..Default::default()
        };
        let decoded =
            decode_stream_with_params(&compressed, &["FlateDecode".to_string()], Some(&params))
                .unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 2, 3, 4]);
    }
}
