use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, Rgba32FImage};
use tilewire::sink::FramebufferSink;

/// Saves the framebuffer as an 8-bit PNG, flipped to a top-left origin.
pub fn write_png(fb: &FramebufferSink, path: &Path) -> Result<()> {
    let w = fb.width() as usize;
    let mut flipped: Vec<[f32; 4]> = Vec::with_capacity(fb.pixels().len());
    for row in fb.pixels().chunks_exact(w.max(1)).rev() {
        flipped.extend_from_slice(row);
    }

    let raw: Vec<f32> = bytemuck::cast_slice(&flipped).to_vec();
    let img = Rgba32FImage::from_raw(fb.width(), fb.height(), raw)
        .context("framebuffer size does not match its dimensions")?;

    DynamicImage::ImageRgba32F(img)
        .to_rgba8()
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    log::info!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilewire::geometry::TileRect;
    use tilewire::sink::ResultSink;

    #[test]
    fn bottom_row_becomes_last_png_row() {
        let mut fb = FramebufferSink::new(2, 2);
        let mut h = fb.begin_result(TileRect::new(0, 0, 2, 1));
        fb.set_pixels(&mut h, &[[1.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 1.0]]);
        fb.end_result(h);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        write_png(&fb, &path).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 1).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }
}
