//! Display-side collaborator contract.
//!
//! The poller hands each decoded tile to a [`ResultSink`] as a
//! begin / set pixels / end triplet. Sinks run on the poller thread.

mod framebuffer;

pub use framebuffer::FramebufferSink;

use crate::decode::Rgba;
use crate::geometry::TileRect;

/// Receives decoded rectangles for display.
pub trait ResultSink: Send + 'static {
    /// Per-result state returned by [`ResultSink::begin_result`].
    type Handle;

    /// Opens a result covering `rect` (device coordinates, bottom-left origin).
    fn begin_result(&mut self, rect: TileRect) -> Self::Handle;

    /// Supplies the rectangle's samples: row-major, `rect.width` per row,
    /// lowest scanline first.
    fn set_pixels(&mut self, handle: &mut Self::Handle, pixels: &[Rgba]);

    /// Commits the result.
    fn end_result(&mut self, handle: Self::Handle);
}
