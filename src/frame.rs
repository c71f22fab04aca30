//! Frame geometry and the reusable raw RGB frame buffer.

use std::fmt;

/// Bytes per RGB pixel.
pub const BYTES_PER_PIXEL: usize = 3;

/// Default output width in terminal columns.
pub const DEFAULT_WIDTH: u16 = 80;

/// Default frame height in source rows: 16:9 of the default width, rounded
/// down to an even number.
pub const DEFAULT_HEIGHT: u16 = ((DEFAULT_WIDTH / 16 * 9) / 2) * 2;

/// Errors raised while building frame geometry or buffers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    ZeroDimension { width: u16, height: u16 },

    #[error("frame height must be even (two source rows per terminal row), got {0}")]
    OddHeight(u16),

    #[error("frame data is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Width and height of a stream's frames, in pixels.
///
/// Height is always even: each terminal row draws two source rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDimensions {
    width: u16,
    height: u16,
}

impl FrameDimensions {
    pub fn new(width: u16, height: u16) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimension { width, height });
        }
        if height % 2 != 0 {
            return Err(FrameError::OddHeight(height));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Size of one raw frame in bytes (`width * height * 3`).
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Number of terminal rows the rendered frame occupies.
    pub fn terminal_rows(&self) -> u16 {
        self.height / 2
    }
}

impl Default for FrameDimensions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl fmt::Display for FrameDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Terminal cell at which a stream's output is anchored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOffset {
    pub x: u16,
    pub y: u16,
}

impl RenderOffset {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// Screen rectangle covered by a rendered stream, in terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u16,
    pub y: u16,
    pub columns: u16,
    pub rows: u16,
}

impl Region {
    pub fn of(dims: FrameDimensions, offset: RenderOffset) -> Self {
        // Terminals treat a 0 coordinate in CUP as 1.
        Self {
            x: offset.x.max(1),
            y: offset.y.max(1),
            columns: dims.width(),
            rows: dims.terminal_rows(),
        }
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        let x_end = self.x as u32 + self.columns as u32;
        let y_end = self.y as u32 + self.rows as u32;
        let other_x_end = other.x as u32 + other.columns as u32;
        let other_y_end = other.y as u32 + other.rows as u32;

        (self.x as u32) < other_x_end
            && (other.x as u32) < x_end
            && (self.y as u32) < other_y_end
            && (other.y as u32) < y_end
    }
}

/// A raw RGB frame, row-major, three bytes per pixel.
///
/// The buffer is allocated once per render loop and refilled in place for
/// every frame.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    data: Vec<u8>,
    dims: FrameDimensions,
}

impl FrameBuffer {
    /// Allocate a zeroed (all black) frame.
    pub fn new(dims: FrameDimensions) -> Self {
        Self {
            data: vec![0; dims.frame_size()],
            dims,
        }
    }

    /// Wrap existing pixel data, checking it holds exactly one frame.
    pub fn from_bytes(dims: FrameDimensions, data: Vec<u8>) -> Result<Self, FrameError> {
        if data.len() != dims.frame_size() {
            return Err(FrameError::SizeMismatch {
                expected: dims.frame_size(),
                actual: data.len(),
            });
        }
        Ok(Self { data, dims })
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dims
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// RGB triple of the pixel at `(row, column)`.
    pub fn pixel(&self, row: usize, column: usize) -> [u8; 3] {
        let start = (row * self.dims.width() as usize + column) * BYTES_PER_PIXEL;
        [self.data[start], self.data[start + 1], self.data[start + 2]]
    }
}
