//! Image and tile layout.
//!
//! Every offset into the shared segment derives from an [`ImageGeometry`]
//! computed once per render.

use crate::error::{Error, Result};

/// Tile edge length used by the renderer unless configured otherwise.
pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Four `f32` channels (R, G, B, A).
pub const BYTES_PER_PIXEL: usize = 16;

/// Pixel rectangle in device coordinates (bottom-left origin).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Immutable tile/pixel layout of one render.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageGeometry {
    width: u32,
    height: u32,
    tile_size: u32,
    tile_count_x: u32,
    tile_count_y: u32,
    tile_count: usize,
    tile_bytes: usize,
    body_bytes: usize,
    total_bytes: usize,
}

impl ImageGeometry {
    /// Computes the layout for a `width` x `height` image split into
    /// `tile_size` x `tile_size` tiles.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self> {
        let invalid = || Error::InvalidGeometry { width, height, tile_size };

        if width == 0 || height == 0 || tile_size == 0 {
            return Err(invalid());
        }

        let tile_count_x = width.div_ceil(tile_size);
        let tile_count_y = height.div_ceil(tile_size);

        // Clip arithmetic works in grid pixels; the padded grid must fit u32.
        tile_count_x.checked_mul(tile_size).ok_or_else(invalid)?;
        tile_count_y.checked_mul(tile_size).ok_or_else(invalid)?;

        let tile_count = (tile_count_x as usize)
            .checked_mul(tile_count_y as usize)
            .ok_or_else(invalid)?;
        let tile_bytes = (tile_size as usize)
            .checked_mul(tile_size as usize)
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(invalid)?;
        let body_bytes = tile_count.checked_mul(tile_bytes).ok_or_else(invalid)?;
        let total_bytes = body_bytes.checked_add(tile_count).ok_or_else(invalid)?;

        Ok(Self {
            width,
            height,
            tile_size,
            tile_count_x,
            tile_count_y,
            tile_count,
            tile_bytes,
            body_bytes,
            total_bytes,
        })
    }

    /// Applies the host's resolution percentage before computing the layout.
    ///
    /// Scaled dimensions are truncated toward zero and must still fit `u32`.
    pub fn from_resolution(
        resolution_x: u32,
        resolution_y: u32,
        percentage: u32,
        tile_size: u32,
    ) -> Result<Self> {
        let scale = |v: u32| {
            u32::try_from(u64::from(v) * u64::from(percentage) / 100).map_err(|_| {
                Error::InvalidGeometry { width: resolution_x, height: resolution_y, tile_size }
            })
        };
        Self::new(scale(resolution_x)?, scale(resolution_y)?, tile_size)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    #[inline]
    pub fn tile_count_x(&self) -> u32 {
        self.tile_count_x
    }

    #[inline]
    pub fn tile_count_y(&self) -> u32 {
        self.tile_count_y
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    /// One completion byte per tile.
    #[inline]
    pub fn header_bytes(&self) -> usize {
        self.tile_count
    }

    #[inline]
    pub fn tile_pixel_count(&self) -> usize {
        self.tile_size as usize * self.tile_size as usize
    }

    #[inline]
    pub fn tile_bytes(&self) -> usize {
        self.tile_bytes
    }

    #[inline]
    pub fn body_bytes(&self) -> usize {
        self.body_bytes
    }

    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Rows by which the tile grid overshoots the image height.
    ///
    /// Always smaller than `tile_size`.
    #[inline]
    pub fn vertical_overhang(&self) -> u32 {
        self.tile_count_y * self.tile_size - self.height
    }

    /// Tile grid coordinates `(column, row)` of tile `index`.
    #[inline]
    pub fn tile_coords(&self, index: usize) -> (u32, u32) {
        let n = self.tile_count_x as usize;
        ((index % n) as u32, (index / n) as u32)
    }

    /// Nominal (unclipped) pixel origin of tile `index`.
    #[inline]
    pub fn tile_origin(&self, index: usize) -> (u32, u32) {
        let (cx, cy) = self.tile_coords(index);
        (cx * self.tile_size, cy * self.tile_size)
    }

    /// Byte offset of tile `index`'s body slot within the segment.
    #[inline]
    pub fn body_offset(&self, index: usize) -> usize {
        self.header_bytes() + index * self.tile_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn rejects_zero_dimensions() {
        assert!(ImageGeometry::new(0, 10, 64).is_err());
        assert!(ImageGeometry::new(10, 0, 64).is_err());
        assert!(ImageGeometry::new(10, 10, 0).is_err());
    }

    #[test]
    fn rejects_grid_overflowing_u32() {
        assert!(matches!(
            ImageGeometry::new(1, u32::MAX, 2),
            Err(Error::InvalidGeometry { height: u32::MAX, .. })
        ));
        assert!(ImageGeometry::new(u32::MAX, 1, 2).is_err());
        // Exact multiple: the grid is the image, no padding to overflow.
        let g = ImageGeometry::new(1, u32::MAX - 4, 1).unwrap();
        assert_eq!(g.vertical_overhang(), 0);
    }

    #[test]
    fn end_to_end_layout() {
        let g = ImageGeometry::new(128, 96, 64).unwrap();
        assert_eq!(g.tile_count_x(), 2);
        assert_eq!(g.tile_count_y(), 2);
        assert_eq!(g.tile_count(), 4);
        assert_eq!(g.tile_bytes(), 65536);
        assert_eq!(g.total_bytes(), 262148);
        assert_eq!(g.vertical_overhang(), 32);
    }

    #[test]
    fn layout_invariants_hold_across_sizes() {
        for &(w, h, t) in &[(1, 1, 1), (100, 37, 64), (1920, 1080, 64), (63, 65, 8), (7, 300, 16)] {
            let g = ImageGeometry::new(w, h, t).unwrap();
            assert_eq!(g.tile_count_x(), w.div_ceil(t));
            assert_eq!(g.tile_count_y(), h.div_ceil(t));
            assert_eq!(g.tile_count() * g.tile_bytes() + g.tile_count(), g.total_bytes());
            assert!(g.vertical_overhang() < t);
        }
    }

    #[test]
    fn exact_multiple_has_no_overhang() {
        let g = ImageGeometry::new(128, 128, 64).unwrap();
        assert_eq!(g.vertical_overhang(), 0);
    }

    #[test]
    fn resolution_percentage_truncates() {
        let g = ImageGeometry::from_resolution(1920, 1080, 50, 64).unwrap();
        assert_eq!((g.width(), g.height()), (960, 540));

        let g = ImageGeometry::from_resolution(101, 33, 50, 64).unwrap();
        assert_eq!((g.width(), g.height()), (50, 16));
    }

    #[test]
    fn percentage_scaling_past_u32_is_rejected() {
        let err = ImageGeometry::from_resolution(u32::MAX, 1080, 200, 64).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry { width: u32::MAX, height: 1080, tile_size: 64 }));
        assert!(ImageGeometry::from_resolution(1920, 3_000_000_000, 150, 64).is_err());
    }

    #[test]
    fn percentage_scaling_to_zero_is_rejected() {
        assert!(ImageGeometry::from_resolution(1, 1, 50, 64).is_err());
    }

    // ── tile addressing ───────────────────────────────────────────────────

    #[test]
    fn tile_coords_are_row_major() {
        let g = ImageGeometry::new(200, 130, 64).unwrap();
        assert_eq!(g.tile_count_x(), 4);
        assert_eq!(g.tile_coords(0), (0, 0));
        assert_eq!(g.tile_coords(3), (3, 0));
        assert_eq!(g.tile_coords(4), (0, 1));
        assert_eq!(g.tile_origin(9), (64, 128));
    }

    #[test]
    fn body_offsets_follow_header() {
        let g = ImageGeometry::new(128, 96, 64).unwrap();
        assert_eq!(g.body_offset(0), 4);
        assert_eq!(g.body_offset(3), 4 + 3 * 65536);
        assert_eq!(g.body_offset(3) + g.tile_bytes(), g.total_bytes());
    }
}
