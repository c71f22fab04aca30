//! Half-block truecolor rendering of raw RGB frames.
//!
//! Each terminal cell shows two vertically stacked pixels: the background
//! color is the top pixel and the foreground color, drawn with a lower half
//! block, is the bottom pixel. A frame of `width x height` pixels therefore
//! fills `width` columns and `height / 2` rows.
//!
//! The output only uses relative cursor movement after the first row, so
//! the same string repaints the stream's region wherever it is anchored.

use std::fmt::Write;

use crate::channel::FormattedFrame;
use crate::frame::{FrameBuffer, FrameDimensions, RenderOffset};

/// Lower half block (U+2584).
pub const HALF_BLOCK: char = '▄';

/// Reset all colors and attributes.
pub const RESET: &str = "\x1b[m";

/// Worst case bytes per cell: two `\x1b[x8;2;255;255;255m` sequences plus the
/// 3-byte glyph.
const MAX_CELL_BYTES: usize = 19 * 2 + 3;

/// Renders frames of one stream at a fixed screen position.
#[derive(Debug, Clone, Copy)]
pub struct FrameRenderer {
    dims: FrameDimensions,
    offset: RenderOffset,
}

impl FrameRenderer {
    pub fn new(dims: FrameDimensions, offset: RenderOffset) -> Self {
        Self { dims, offset }
    }

    /// Upper bound on the rendered size of one frame, in bytes.
    pub fn capacity_hint(&self) -> usize {
        let cells = self.dims.width() as usize * self.dims.terminal_rows() as usize;
        cells * MAX_CELL_BYTES + self.dims.terminal_rows() as usize * 16 + 32
    }

    /// Render `frame` into a fresh [`FormattedFrame`].
    pub fn render(&self, frame: &FrameBuffer) -> FormattedFrame {
        let mut out = String::with_capacity(self.capacity_hint());
        self.render_into(frame, &mut out);
        FormattedFrame::new(out)
    }

    /// Render `frame` into `out`, replacing its contents.
    ///
    /// # Panics
    /// If `frame` does not have this renderer's dimensions.
    pub fn render_into(&self, frame: &FrameBuffer, out: &mut String) {
        assert_eq!(
            frame.dimensions(),
            self.dims,
            "frame dimensions do not match renderer"
        );

        let width = self.dims.width() as usize;
        let height = self.dims.height() as usize;

        out.clear();

        // Writing to a String cannot fail.
        let _ = write!(out, "\x1b[{};{}H", self.offset.y, self.offset.x);

        for row in (0..height).step_by(2) {
            for column in 0..width {
                let [tr, tg, tb] = frame.pixel(row, column);
                let [br, bg, bb] = frame.pixel(row + 1, column);
                let _ = write!(
                    out,
                    "\x1b[48;2;{tr};{tg};{tb}m\x1b[38;2;{br};{bg};{bb}m{HALF_BLOCK}"
                );
            }
            // Down one line, back to the starting column.
            let _ = write!(out, "\x1b[B\x1b[{}D", width);
        }

        out.push_str(RESET);
    }
}
