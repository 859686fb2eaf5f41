//! Placeholder fill: write the encoded signature into the reserved `/Contents`.

use super::byterange::PlaceholderLayout;
use super::cms::CmsSignature;
use crate::error::{Error, Result};
use crate::writer::hex_upper;

/// Write `cms` as uppercase hex into the placeholder of `skeleton`.
///
/// The hex digits are right-padded with ASCII `0` up to the reserved size, so
/// the document length and every offset stay unchanged. Nothing is written
/// unless the signature fits.
///
/// # Errors
///
/// - [`Error::PlaceholderOverflow`] if `cms` is longer than `layout.max_length`
/// - [`Error::MalformedDocument`] if `layout` does not describe `skeleton`
pub fn fill(mut skeleton: Vec<u8>, layout: &PlaceholderLayout, cms: &CmsSignature) -> Result<Vec<u8>> {
    if cms.len() > layout.max_length {
        return Err(Error::PlaceholderOverflow {
            actual: cms.len(),
            max: layout.max_length,
        });
    }
    layout.check_against(&skeleton)?;

    let start = layout.placeholder_offset + 1;
    let end = start + layout.max_length * 2;
    let hex = hex_upper(cms.as_bytes());
    let (digits, padding) = skeleton[start..end].split_at_mut(hex.len());
    digits.copy_from_slice(hex.as_bytes());
    padding.fill(b'0');

    log::debug!(
        "Filled placeholder at {} with {} of {} reserved bytes",
        layout.placeholder_offset,
        cms.len(),
        layout.max_length
    );
    Ok(skeleton)
}
