use crate::decode::Rgba;
use crate::geometry::{ImageGeometry, TileRect};

use super::ResultSink;

/// Composites delivered tiles into one full-resolution RGBA buffer.
///
/// Row 0 of the buffer is the bottom scanline of the image.
#[derive(Debug, Clone)]
pub struct FramebufferSink {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
    results: usize,
}

/// Pending write into a [`FramebufferSink`].
#[derive(Debug)]
pub struct FramebufferResult {
    rect: TileRect,
    pixels: Vec<Rgba>,
}

impl FramebufferSink {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width as usize * height as usize],
            results: 0,
        }
    }

    pub fn for_geometry(geometry: &ImageGeometry) -> Self {
        Self::new(geometry.width(), geometry.height())
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of committed results.
    #[inline]
    pub fn results(&self) -> usize {
        self.results
    }

    #[inline]
    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    /// Sample at `(x, y)`, bottom-left origin.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y as usize * self.width as usize + x as usize])
    }

    pub fn into_pixels(self) -> Vec<Rgba> {
        self.pixels
    }
}

impl ResultSink for FramebufferSink {
    type Handle = FramebufferResult;

    fn begin_result(&mut self, rect: TileRect) -> FramebufferResult {
        FramebufferResult { rect, pixels: Vec::new() }
    }

    fn set_pixels(&mut self, handle: &mut FramebufferResult, pixels: &[Rgba]) {
        handle.pixels.clear();
        handle.pixels.extend_from_slice(pixels);
    }

    fn end_result(&mut self, handle: FramebufferResult) {
        let FramebufferResult { rect, pixels } = handle;
        if rect.is_empty() || rect.x >= self.width {
            return;
        }

        // Clip against the framebuffer; anything outside is dropped.
        let cols = rect.width.min(self.width.saturating_sub(rect.x)) as usize;
        let fb_w = self.width as usize;

        for (row, src) in pixels.chunks(rect.width as usize).enumerate() {
            let y = rect.y as usize + row;
            if y >= self.height as usize {
                break;
            }
            let n = cols.min(src.len());
            let dst = y * fb_w + rect.x as usize;
            self.pixels[dst..dst + n].copy_from_slice(&src[..n]);
        }

        self.results += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deliver(fb: &mut FramebufferSink, rect: TileRect, pixels: &[Rgba]) {
        let mut h = fb.begin_result(rect);
        fb.set_pixels(&mut h, pixels);
        fb.end_result(h);
    }

    #[test]
    fn places_rect_at_offset() {
        let mut fb = FramebufferSink::new(4, 3);
        let px: Vec<Rgba> = (0..4).map(|i| [i as f32, 0.0, 0.0, 1.0]).collect();
        deliver(&mut fb, TileRect::new(2, 1, 2, 2), &px);

        assert_eq!(fb.pixel(2, 1), Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(fb.pixel(3, 1), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(fb.pixel(2, 2), Some([2.0, 0.0, 0.0, 1.0]));
        assert_eq!(fb.pixel(3, 2), Some([3.0, 0.0, 0.0, 1.0]));
        assert_eq!(fb.pixel(0, 0), Some([0.0; 4]));
        assert_eq!(fb.results(), 1);
    }

    #[test]
    fn overflowing_rect_is_clipped() {
        let mut fb = FramebufferSink::new(3, 2);
        deliver(&mut fb, TileRect::new(2, 1, 2, 2), &[[1.0; 4]; 4]);
        assert_eq!(fb.pixel(2, 1), Some([1.0; 4]));
        assert_eq!(fb.pixels().iter().filter(|p| p[0] == 1.0).count(), 1);
    }

    #[test]
    fn out_of_range_pixel_is_none() {
        let fb = FramebufferSink::new(2, 2);
        assert_eq!(fb.pixel(2, 0), None);
        assert_eq!(fb.pixel(0, 2), None);
    }
}
