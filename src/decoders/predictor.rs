//! PNG and TIFF predictor decoding.
//!
//! Cross-reference streams written by most producers use FlateDecode with
//! `/Predictor 12` (PNG Up). Each PNG row starts with a tag byte naming the
//! algorithm used for that row.

use crate::error::{Error, Result};

/// Decode parameters for predictor-encoded streams.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (samples per row)
    pub columns: usize,
    /// Number of color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Bytes of sample data per row, excluding any PNG tag byte.
    pub fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Bytes per complete pixel, at least 1 (the PNG filter distance).
    fn pixel_bytes(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse a predictor.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(data, params),
        other => Err(Error::UnsupportedFeature(format!("predictor {}", other))),
    }
}

fn decode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::UnsupportedFeature(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }

    let row_len = params.row_bytes();
    let colors = params.colors;
    let mut output = data.to_vec();
    for row in output.chunks_mut(row_len) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(output)
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.row_bytes();
    let stride = row_len + 1;
    if data.len() % stride != 0 {
        return Err(Error::MalformedDocument(format!(
            "predictor data length {} is not a multiple of row size {}",
            data.len(),
            stride
        )));
    }

    let bpp = params.pixel_bytes();
    let mut output = Vec::with_capacity(data.len() / stride * row_len);
    let mut prior = vec![0u8; row_len];

    for encoded in data.chunks(stride) {
        let (tag, encoded) = (encoded[0], &encoded[1..]);
        let mut row = vec![0u8; row_len];

        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prior[i];
            let upper_left = if i >= bpp { prior[i - bpp] } else { 0 };

            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, upper_left),
                other => {
                    return Err(Error::MalformedDocument(format!("invalid PNG row tag {}", other)));
                },
            };
            row[i] = encoded[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&row);
        prior = row;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
