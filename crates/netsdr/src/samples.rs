//! Sample body decoding.
//!
//! A data-item body is a packed run of little-endian signed integers. The
//! storage width follows the bit depth: 1 byte up to 8 bits, 2 bytes up to
//! 16, 4 bytes up to 32. Each value is sign-extended to `i32`.
//!
//! Validation happens up front in [`decode_samples`]; iteration itself
//! cannot fail.

use std::iter::FusedIterator;

use netsdr_core::error::{CodecError, Result};

/// Storage width in bytes for a bit depth.
fn sample_width(bit_depth: u16) -> std::result::Result<usize, CodecError> {
    match bit_depth {
        1..=8 => Ok(1),
        9..=16 => Ok(2),
        17..=32 => Ok(4),
        _ => Err(CodecError::UnsupportedBitDepth(bit_depth)),
    }
}

/// Lazily decoded samples borrowed from a body.
#[derive(Debug, Clone)]
pub struct Samples<'a> {
    body: &'a [u8],
    width: usize,
}

impl Samples<'_> {
    /// Bytes per sample.
    pub fn width(&self) -> usize {
        self.width
    }
}

impl Iterator for Samples<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        if self.body.len() < self.width {
            return None;
        }
        let (head, rest) = self.body.split_at(self.width);
        self.body = rest;
        Some(match head {
            &[b0] => b0 as i8 as i32,
            &[b0, b1] => i16::from_le_bytes([b0, b1]) as i32,
            &[b0, b1, b2, b3] => i32::from_le_bytes([b0, b1, b2, b3]),
            _ => return None,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.body.len() / self.width;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Samples<'_> {}

impl FusedIterator for Samples<'_> {}

/// Decode a sample body at the given bit depth.
///
/// Fails with [`CodecError::UnsupportedBitDepth`] outside 1..=32, or
/// [`CodecError::MisalignedBody`] when the body is not a whole number of
/// samples. An empty body yields an empty sequence.
///
/// # Example
///
/// ```
/// use netsdr::samples::decode_samples;
///
/// let values: Vec<i32> = decode_samples(16, &[0x01, 0x00, 0xFF, 0xFF])
///     .unwrap()
///     .collect();
/// assert_eq!(values, vec![1, -1]);
/// ```
pub fn decode_samples(bit_depth: u16, body: &[u8]) -> Result<Samples<'_>> {
    let width = sample_width(bit_depth)?;
    if body.len() % width != 0 {
        return Err(CodecError::MisalignedBody {
            len: body.len(),
            width,
        }
        .into());
    }
    Ok(Samples { body, width })
}
