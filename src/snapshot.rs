//! Immutable pixel captures of the editing surface.

use std::{fmt, sync::Arc, time::Instant};

use crate::surface::SurfaceError;

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Full capture of surface pixel state at one instant.
///
/// The buffer is shared read-only; cloning a snapshot never copies pixels.
#[derive(Clone)]
pub struct Snapshot {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
    captured_at: Instant,
    compression_level: Option<f32>,
}

impl Snapshot {
    /// Builds an uncompressed RGBA snapshot.
    ///
    /// Fails when either dimension is zero or the buffer length is not
    /// `width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, SurfaceError> {
        let expected = expected_len(width, height)?;
        if pixels.len() != expected {
            return Err(SurfaceError::BufferLength {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
            captured_at: Instant::now(),
            compression_level: None,
        })
    }

    /// Builds a snapshot holding codec output. The buffer length is not checked.
    pub fn encoded(
        width: u32,
        height: u32,
        bytes: Vec<u8>,
        level: f32,
    ) -> Result<Self, SurfaceError> {
        expected_len(width, height)?;
        Ok(Self {
            width,
            height,
            pixels: bytes.into(),
            captured_at: Instant::now(),
            compression_level: Some(level.clamp(0.0, 1.0)),
        })
    }

    /// Zero-filled (transparent black) snapshot.
    pub fn blank(width: u32, height: u32) -> Result<Self, SurfaceError> {
        let len = expected_len(width, height)?;
        Self::new(width, height, vec![0; len])
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw (or encoded, see [`Self::is_compressed`]) bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Monotonic capture time.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// True when [`Self::pixels`] holds a codec representation.
    pub fn is_compressed(&self) -> bool {
        self.compression_level.is_some()
    }

    /// Quality the codec was asked for, if compressed.
    pub fn compression_level(&self) -> Option<f32> {
        self.compression_level
    }

    /// Retained byte cost.
    pub fn size_bytes(&self) -> usize {
        self.pixels.len()
    }

    /// Byte-for-byte comparison of dimensions and buffer.
    pub fn same_pixels(&self, other: &Snapshot) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.compression_level == other.compression_level
            && self.pixels == other.pixels
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .field("compression_level", &self.compression_level)
            .finish()
    }
}

/// Uncompressed RGBA length for the given dimensions.
pub fn expected_len(width: u32, height: u32) -> Result<usize, SurfaceError> {
    if width == 0 || height == 0 {
        return Err(SurfaceError::InvalidDimensions { width, height });
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(BYTES_PER_PIXEL))
        .ok_or(SurfaceError::InvalidDimensions { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        let err = Snapshot::new(2, 2, vec![0; 15]).unwrap_err();
        assert_eq!(
            err,
            SurfaceError::BufferLength {
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            Snapshot::blank(0, 4),
            Err(SurfaceError::InvalidDimensions { width: 0, height: 4 })
        ));
    }

    #[test]
    fn clone_shares_buffer() {
        let snap = Snapshot::new(1, 1, vec![1, 2, 3, 4]).unwrap();
        let copy = snap.clone();
        assert!(std::ptr::eq(snap.pixels().as_ptr(), copy.pixels().as_ptr()));
        assert!(snap.same_pixels(&copy));
        assert_eq!(copy.size_bytes(), 4);
        assert!(!copy.is_compressed());
    }

    #[test]
    fn encoded_keeps_dimensions_and_level() {
        let snap = Snapshot::encoded(10, 10, vec![9; 3], 1.5).unwrap();
        assert!(snap.is_compressed());
        assert_eq!(snap.compression_level(), Some(1.0));
        assert_eq!(snap.size_bytes(), 3);
        assert_eq!((snap.width(), snap.height()), (10, 10));
    }
}
