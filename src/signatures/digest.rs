//! Range digest: hash everything except the signature placeholder.

use super::byterange::PlaceholderLayout;
use super::types::DigestAlgorithm;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::io::{Read, Seek, SeekFrom};

/// Read size used while streaming the ranges.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Running hash state for one of the supported algorithms.
#[derive(Clone)]
pub enum RangeHasher {
    /// SHA-256 state
    Sha256(Sha256),
    /// SHA-384 state
    Sha384(Sha384),
    /// SHA-512 state
    Sha512(Sha512),
}

impl RangeHasher {
    /// Fresh state for `algorithm`.
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha256 => RangeHasher::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => RangeHasher::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => RangeHasher::Sha512(Sha512::new()),
        }
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            RangeHasher::Sha256(h) => h.update(data),
            RangeHasher::Sha384(h) => h.update(data),
            RangeHasher::Sha512(h) => h.update(data),
        }
    }

    /// Consume the state and return the digest.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            RangeHasher::Sha256(h) => h.finalize().to_vec(),
            RangeHasher::Sha384(h) => h.finalize().to_vec(),
            RangeHasher::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Digest over the two ranges of a [`PlaceholderLayout`].
pub struct RangeDigest;

impl RangeDigest {
    /// Stream the pre- and post-placeholder ranges of `reader` through the hash.
    ///
    /// Reads in [`CHUNK_SIZE`] chunks and never touches the placeholder bytes.
    /// A source shorter than the layout is an [`Error::Io`] (unexpected EOF).
    pub fn compute_reader<R: Read + Seek>(
        reader: &mut R,
        layout: &PlaceholderLayout,
        algorithm: DigestAlgorithm,
    ) -> Result<Vec<u8>> {
        let mut hasher = RangeHasher::new(algorithm);
        let mut buf = vec![0u8; CHUNK_SIZE];

        for (offset, length) in [layout.pre_range, layout.post_range] {
            reader.seek(SeekFrom::Start(offset as u64))?;
            let mut remaining = length;
            while remaining > 0 {
                let n = remaining.min(CHUNK_SIZE);
                reader.read_exact(&mut buf[..n])?;
                hasher.update(&buf[..n]);
                remaining -= n;
            }
        }

        let digest = hasher.finalize();
        log::debug!(
            "{} range digest over {} bytes",
            algorithm,
            layout.byte_range().signed_len()
        );
        Ok(digest)
    }

    /// In-memory variant of [`RangeDigest::compute_reader`].
    pub fn compute(
        data: &[u8],
        layout: &PlaceholderLayout,
        algorithm: DigestAlgorithm,
    ) -> Result<Vec<u8>> {
        let mut hasher = RangeHasher::new(algorithm);
        for (offset, length) in [layout.pre_range, layout.post_range] {
            let range = offset
                .checked_add(length)
                .and_then(|end| data.get(offset..end))
                .ok_or_else(|| {
                    Error::MalformedDocument(format!(
                        "range {}+{} is outside the {}-byte document",
                        offset,
                        length,
                        data.len()
                    ))
                })?;
            for chunk in range.chunks(CHUNK_SIZE) {
                hasher.update(chunk);
            }
        }

        log::debug!(
            "{} range digest over {} bytes",
            algorithm,
            layout.byte_range().signed_len()
        );
        Ok(hasher.finalize())
    }
}

/// Digest of `document` excluding the placeholder described by `layout`.
pub fn digest(
    document: &[u8],
    layout: &PlaceholderLayout,
    algorithm: DigestAlgorithm,
) -> Result<Vec<u8>> {
    RangeDigest::compute(document, layout, algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// "AAA" + placeholder "BBB" + "CCC"
    fn layout() -> PlaceholderLayout {
        PlaceholderLayout {
            pre_range: (0, 3),
            post_range: (6, 3),
            placeholder_offset: 3,
            max_length: 0,
        }
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_golden_vectors() {
        let data = b"AAABBBCCC";
        assert_eq!(
            hex(&digest(data, &layout(), DigestAlgorithm::Sha256).unwrap()),
            "a271161b5f1667f3ce3c3969761c6c65e1974a6e907cc42b1b7e5a772efa30b8"
        );
        assert_eq!(
            hex(&digest(data, &layout(), DigestAlgorithm::Sha384).unwrap()),
            "6753de4b8ba59e2934424fa52d15d69ab70673e8113473f9d185f4703eb8758bc78187c9e584a0c2ce5ef98259a331fd"
        );
        assert_eq!(
            hex(&digest(data, &layout(), DigestAlgorithm::Sha512).unwrap()),
            "302f6d042c0b7e0903369ae5fc919a1ee5cf0dff59f1951dc63a84759908b8034b7d0ac024868b59511f497efd60c2dbfca7c90718f9dbe94a0daef6e3d0d4f3"
        );
    }

    #[test]
    fn test_placeholder_bytes_do_not_matter() {
        let a = digest(b"AAABBBCCC", &layout(), DigestAlgorithm::Sha256).unwrap();
        let b = digest(b"AAAXYZCCC", &layout(), DigestAlgorithm::Sha256).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, DigestAlgorithm::Sha256.digest(b"AAACCC"));
    }

    #[test]
    fn test_reader_matches_slice_across_chunks() {
        let data: Vec<u8> = (0..(3 * CHUNK_SIZE + 17)).map(|i| (i % 251) as u8).collect();
        let layout = PlaceholderLayout {
            pre_range: (0, CHUNK_SIZE + 5),
            post_range: (CHUNK_SIZE + 105, data.len() - CHUNK_SIZE - 105),
            placeholder_offset: CHUNK_SIZE + 5,
            max_length: 49,
        };
        let from_slice = RangeDigest::compute(&data, &layout, DigestAlgorithm::Sha512).unwrap();
        let from_reader =
            RangeDigest::compute_reader(&mut Cursor::new(&data), &layout, DigestAlgorithm::Sha512)
                .unwrap();
        assert_eq!(from_slice, from_reader);
    }

    #[test]
    fn test_short_input_is_rejected() {
        assert!(matches!(
            digest(b"AAABBBCC", &layout(), DigestAlgorithm::Sha256),
            Err(Error::MalformedDocument(_))
        ));
        assert!(matches!(
            RangeDigest::compute_reader(&mut Cursor::new(b"AAABBBCC"), &layout(), DigestAlgorithm::Sha256),
            Err(Error::Io(_))
        ));
    }
}
