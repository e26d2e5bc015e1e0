//! Tile body decoding.
//!
//! A tile slot holds `tile_size` rows of RGBA `f32` samples in the renderer's
//! native byte order. Edge tiles are packed with a row stride equal to their
//! clipped width, and the tile row at the bottom of the grid starts with
//! `vertical_overhang` rows that lie outside the image and are skipped.

use std::fmt;

use crate::channel::SharedChannel;
use crate::error::Error;
use crate::geometry::{ImageGeometry, TileRect, BYTES_PER_PIXEL};

/// One RGBA sample.
pub type Rgba = [f32; 4];

/// Destination rectangle of a tile plus the rows to skip in its slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClippedTile {
    pub index: usize,
    pub rect: TileRect,
    pub skip_rows: u32,
}

impl ClippedTile {
    /// Clips tile `index` against the image bounds.
    pub fn new(geometry: &ImageGeometry, index: usize) -> Self {
        let tile = geometry.tile_size();
        let (tx, ty) = geometry.tile_origin(index);
        let overhang = geometry.vertical_overhang();

        let width = tile.min(geometry.width() - tx);
        let skip_rows = overhang.saturating_sub(ty);

        Self {
            index,
            rect: TileRect::new(tx, ty.saturating_sub(overhang), width, tile - skip_rows),
            skip_rows,
        }
    }

    /// Bytes of valid pixel data following the skipped rows.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.rect.pixel_count() * BYTES_PER_PIXEL
    }
}

/// A decoded, clipped tile ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTile {
    pub index: usize,
    pub rect: TileRect,
    /// Row-major, `rect.width` samples per row.
    pub pixels: Vec<Rgba>,
}

impl DecodedTile {
    /// Iterates rows from the tile's lowest scanline upward.
    pub fn rows(&self) -> std::slice::ChunksExact<'_, Rgba> {
        self.pixels.chunks_exact(self.rect.width.max(1) as usize)
    }
}

#[derive(Debug)]
pub enum DecodeError {
    /// Fewer bytes than the clipped rectangle requires.
    Truncated { index: usize, expected: usize, actual: usize },
    /// The slot could not be read from the channel.
    Channel(Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { index, expected, actual } => write!(
                f,
                "tile {index}: expected {expected} bytes of pixel data, got {actual}"
            ),
            DecodeError::Channel(e) => write!(f, "tile read failed: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Channel(e) => Some(e),
            DecodeError::Truncated { .. } => None,
        }
    }
}

impl From<Error> for DecodeError {
    fn from(e: Error) -> Self {
        DecodeError::Channel(e)
    }
}

/// Reinterprets `bytes` (already positioned past the skipped rows) as the
/// clipped tile's samples. Trailing bytes beyond the rectangle are ignored.
pub fn decode_bytes(clip: &ClippedTile, bytes: &[u8]) -> Result<DecodedTile, DecodeError> {
    let need = clip.byte_len();
    if bytes.len() < need {
        return Err(DecodeError::Truncated { index: clip.index, expected: need, actual: bytes.len() });
    }

    // Copying collect: slot offsets are not 4-byte aligned in general.
    let pixels: Vec<Rgba> = bytemuck::pod_collect_to_vec(&bytes[..need]);

    Ok(DecodedTile { index: clip.index, rect: clip.rect, pixels })
}

/// Reads and decodes tile `index` from the channel.
pub fn decode_tile(channel: &SharedChannel, index: usize) -> Result<DecodedTile, DecodeError> {
    let clip = ClippedTile::new(channel.geometry(), index);
    let bytes = channel.read_tile_bytes(index, clip.skip_rows as usize, clip.rect.width as usize)?;
    decode_bytes(&clip, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::tests::unique_name;

    fn pattern(index: usize, n: usize) -> Vec<Rgba> {
        (0..n)
            .map(|p| {
                let v = (index * 100_000 + p) as f32;
                [v, v + 0.25, -v, 1.0]
            })
            .collect()
    }

    // ── clipping ──────────────────────────────────────────────────────────

    #[test]
    fn interior_tile_is_unclipped() {
        let g = ImageGeometry::new(128, 128, 64).unwrap();
        let c = ClippedTile::new(&g, 3);
        assert_eq!(c.rect, TileRect::new(64, 64, 64, 64));
        assert_eq!(c.skip_rows, 0);
    }

    #[test]
    fn right_column_is_clipped_to_image_width() {
        let g = ImageGeometry::new(100, 64, 64).unwrap();
        assert_eq!(g.tile_count_x(), 2);
        let c = ClippedTile::new(&g, 1);
        assert_eq!(c.rect.width, 36);
        assert_eq!(c.rect.x, 64);
        assert_eq!(ClippedTile::new(&g, 0).rect.width, 64);
    }

    #[test]
    fn bottom_row_skips_overhang() {
        let g = ImageGeometry::new(128, 96, 64).unwrap();
        let c = ClippedTile::new(&g, 1);
        assert_eq!(c.rect, TileRect::new(64, 0, 64, 32));
        assert_eq!(c.skip_rows, 32);

        let upper = ClippedTile::new(&g, 2);
        assert_eq!(upper.rect, TileRect::new(0, 32, 64, 64));
        assert_eq!(upper.skip_rows, 0);
    }

    #[test]
    fn clipped_rects_cover_image_exactly() {
        let g = ImageGeometry::new(150, 100, 64).unwrap();
        let area: usize = (0..g.tile_count()).map(|i| ClippedTile::new(&g, i).rect.pixel_count()).sum();
        assert_eq!(area, 150 * 100);
    }

    // ── decoding ──────────────────────────────────────────────────────────

    #[test]
    fn full_tile_reproduces_pattern() {
        let g = ImageGeometry::new(128, 128, 64).unwrap();
        let ch = SharedChannel::open(&unique_name("decode_full"), &g).unwrap();
        let expected = pattern(2, g.tile_pixel_count());
        ch.write_tile_bytes(2, 0, bytemuck::cast_slice(&expected)).unwrap();

        let tile = decode_tile(&ch, 2).unwrap();
        assert_eq!(tile.rect, TileRect::new(0, 64, 64, 64));
        assert_eq!(tile.pixels, expected);
        assert_eq!(tile.rows().count(), 64);
    }

    #[test]
    fn edge_tile_uses_clipped_stride() {
        let g = ImageGeometry::new(100, 96, 64).unwrap();
        let ch = SharedChannel::open(&unique_name("decode_edge"), &g).unwrap();
        let clip = ClippedTile::new(&g, 1);
        assert_eq!((clip.rect.width, clip.rect.height, clip.skip_rows), (36, 32, 32));

        let expected = pattern(1, 36 * 32);
        let skip = 32 * 36 * BYTES_PER_PIXEL;
        ch.write_tile_bytes(1, skip, bytemuck::cast_slice(&expected)).unwrap();

        let tile = decode_tile(&ch, 1).unwrap();
        assert_eq!(tile.rect, TileRect::new(64, 0, 36, 32));
        assert_eq!(tile.pixels.len(), 36 * 32);
        assert_eq!(tile.pixels, expected);
        assert!(tile.rows().all(|r| r.len() == 36));
    }

    #[test]
    fn unaligned_input_decodes() {
        let clip = ClippedTile { index: 0, rect: TileRect::new(0, 0, 1, 1), skip_rows: 0 };
        let mut buf = vec![0u8; 17];
        buf[1..].copy_from_slice(bytemuck::cast_slice(&[[1.0f32, 2.0, 3.0, 4.0]]));
        let tile = decode_bytes(&clip, &buf[1..]).unwrap();
        assert_eq!(tile.pixels, vec![[1.0, 2.0, 3.0, 4.0]]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let clip = ClippedTile { index: 5, rect: TileRect::new(0, 0, 2, 2), skip_rows: 0 };
        let err = decode_bytes(&clip, &[0u8; 48]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { index: 5, expected: 64, actual: 48 }));
    }
}
