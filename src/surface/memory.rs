use async_trait::async_trait;

use crate::snapshot::{expected_len, Snapshot, BYTES_PER_PIXEL};

use super::{Surface, SurfaceError};

/// Plain RGBA buffer implementing [`Surface`].
///
/// Cannot decode compressed snapshots; pair it with a
/// [`SnapshotCodec`](super::SnapshotCodec) on the engine when compression is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl MemorySurface {
    /// Transparent surface of the given size.
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    /// Surface with every pixel set to `rgba`.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, SurfaceError> {
        let len = expected_len(width, height)?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| SurfaceError::Allocation(len))?;
        for _ in 0..len / BYTES_PER_PIXEL {
            pixels.extend_from_slice(&rgba);
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at `(x, y)`, or `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let at = self.offset(x, y)?;
        let px = &self.pixels[at..at + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Returns false when `(x, y)` is out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) -> bool {
        match self.offset(x, y) {
            Some(at) => {
                self.pixels[at..at + BYTES_PER_PIXEL].copy_from_slice(&rgba);
                true
            }
            None => false,
        }
    }

    /// Sets every pixel to `rgba`.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Fills the intersection of the rectangle with the surface.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: [u8; 4]) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for row in y..y_end {
            for col in x..x_end {
                self.set_pixel(col, row, rgba);
            }
        }
    }

    /// Resizes in place, keeping the top-left overlap and zero-filling the rest.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        let mut next = Self::new(width, height)?;
        for row in 0..self.height.min(height) {
            for col in 0..self.width.min(width) {
                if let Some(px) = self.pixel(col, row) {
                    next.set_pixel(col, row, px);
                }
            }
        }
        *self = next;
        Ok(())
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL)
    }
}

#[async_trait]
impl Surface for MemorySurface {
    async fn capture(&mut self) -> Result<Snapshot, SurfaceError> {
        Snapshot::new(self.width, self.height, self.pixels.clone())
    }

    async fn apply(&mut self, snapshot: &Snapshot) -> Result<(), SurfaceError> {
        if snapshot.is_compressed() {
            return Err(SurfaceError::Codec(
                "memory surface cannot decode compressed snapshots".to_string(),
            ));
        }
        self.width = snapshot.width();
        self.height = snapshot.height();
        self.pixels = snapshot.pixels().to_vec();
        Ok(())
    }
}
