//! Frame extraction from raw RGB byte streams.
//!
//! A stream is anything implementing [`PixelStream`]: a reader that can
//! report how many bytes are buffered but not yet consumed, and discard
//! them. [`extract_frame`] uses that to drop stale frames before reading,
//! so a renderer that falls behind shows the newest picture instead of
//! lagging further and further.
//!
//! - [`BacklogReader`] pumps any reader on a background thread and exposes
//!   the accumulated backlog
//! - `BufReader<R>` works too, with its internal buffer as the backlog

mod pump;

use std::io::{self, BufRead, BufReader, Read};

pub use pump::{BacklogReader, DEFAULT_BACKLOG_FRAMES, MAX_BACKLOG_CAPACITY_FRAMES};

/// Number of whole frames allowed to sit in the backlog before older ones
/// are dropped.
pub const MAX_BACKLOG_FRAMES: usize = 2;

/// Errors that end frame extraction.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream reached EOF before a full frame was available.
    #[error("stream closed before a full frame was read")]
    Closed,

    #[error("stream read failed: {0}")]
    Io(#[from] io::Error),
}

/// A byte stream with an inspectable read-ahead buffer.
pub trait PixelStream: Read {
    /// Bytes already buffered and not yet consumed.
    fn buffered(&self) -> usize;

    /// Drop up to `n` buffered bytes, returning how many were dropped.
    fn discard(&mut self, n: usize) -> io::Result<usize>;
}

impl<R: Read> PixelStream for BufReader<R> {
    fn buffered(&self) -> usize {
        self.buffer().len()
    }

    fn discard(&mut self, n: usize) -> io::Result<usize> {
        let n = n.min(self.buffer().len());
        self.consume(n);
        Ok(n)
    }
}

impl<S: PixelStream + ?Sized> PixelStream for Box<S> {
    fn buffered(&self) -> usize {
        (**self).buffered()
    }

    fn discard(&mut self, n: usize) -> io::Result<usize> {
        (**self).discard(n)
    }
}

/// Drop whole frames until at most [`MAX_BACKLOG_FRAMES`] remain buffered.
///
/// Only complete `frame_size` chunks are removed, so the stream stays
/// aligned on frame boundaries.
pub fn trim_backlog<S: PixelStream + ?Sized>(stream: &mut S, frame_size: usize) -> io::Result<()> {
    if frame_size == 0 {
        return Ok(());
    }
    let limit = frame_size * MAX_BACKLOG_FRAMES;
    while stream.buffered() > limit {
        let dropped = stream.discard(frame_size)?;
        if dropped < frame_size {
            // Buffer shrank underneath us; whatever remains is under the limit.
            break;
        }
    }
    Ok(())
}

/// Fill `frame` with the next frame to render.
///
/// Stale frames are trimmed first, then exactly `frame.len()` bytes are read,
/// blocking until they arrive. A stream that ends part way through a frame
/// yields [`StreamError::Closed`] and `frame` contents are unspecified.
pub fn extract_frame<S: PixelStream + ?Sized>(
    stream: &mut S,
    frame: &mut [u8],
) -> Result<(), StreamError> {
    trim_backlog(stream, frame.len())?;

    stream.read_exact(frame).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StreamError::Closed
        } else {
            StreamError::Io(e)
        }
    })
}
