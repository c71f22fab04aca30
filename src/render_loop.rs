//! Per-source render loop: extract, render, hand off, repeat.

use std::fmt;
use std::io;
use std::thread::{self, JoinHandle};

use crate::cancel::CancelToken;
use crate::channel::FrameSender;
use crate::frame::{FrameBuffer, FrameDimensions, RenderOffset};
use crate::render::FrameRenderer;
use crate::stream::{extract_frame, PixelStream, StreamError};

/// Why a render loop stopped.
#[derive(Debug)]
pub enum LoopExit {
    /// The cancel token was set.
    Cancelled,
    /// The configured frame limit was reached.
    FrameLimit,
    /// The source hit EOF, possibly part way through a frame.
    SourceClosed,
    /// Reading the source failed.
    SourceFailed(io::Error),
    /// The display thread stopped receiving.
    OutputClosed,
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopExit::Cancelled => write!(f, "cancelled"),
            LoopExit::FrameLimit => write!(f, "frame limit reached"),
            LoopExit::SourceClosed => write!(f, "source closed"),
            LoopExit::SourceFailed(e) => write!(f, "source failed: {}", e),
            LoopExit::OutputClosed => write!(f, "output closed"),
        }
    }
}

/// Summary returned when a render loop finishes.
#[derive(Debug)]
pub struct LoopReport {
    /// Frames submitted to the output channel.
    pub frames: u64,
    pub exit: LoopExit,
}

/// Renders one pixel stream into the shared output channel.
///
/// The loop owns its stream and frame buffer; nothing on the hot path is
/// shared with other loops.
pub struct RenderLoop<S> {
    name: String,
    stream: S,
    frame: FrameBuffer,
    renderer: FrameRenderer,
    output: FrameSender,
    cancel: CancelToken,
    max_frames: Option<u64>,
}

impl<S> fmt::Debug for RenderLoop<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderLoop")
            .field("name", &self.name)
            .field("renderer", &self.renderer)
            .field("max_frames", &self.max_frames)
            .finish_non_exhaustive()
    }
}

impl<S: PixelStream> RenderLoop<S> {
    pub fn new(
        stream: S,
        dims: FrameDimensions,
        offset: RenderOffset,
        output: FrameSender,
        cancel: CancelToken,
    ) -> Self {
        Self {
            name: "stream".to_string(),
            stream,
            frame: FrameBuffer::new(dims),
            renderer: FrameRenderer::new(dims, offset),
            output,
            cancel,
            max_frames: None,
        }
    }

    /// Name used for the thread and log messages.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Stop after submitting `limit` frames.
    pub fn with_max_frames(mut self, limit: u64) -> Self {
        self.max_frames = Some(limit);
        self
    }

    /// Run until the source ends, the output closes, or the loop is cancelled.
    pub fn run(mut self) -> LoopReport {
        let mut frames = 0u64;

        let exit = loop {
            if self.cancel.is_cancelled() {
                break LoopExit::Cancelled;
            }
            if self.max_frames.is_some_and(|limit| frames >= limit) {
                break LoopExit::FrameLimit;
            }

            match extract_frame(&mut self.stream, self.frame.as_mut_bytes()) {
                Ok(()) => {}
                // Streams that honor the token fail their read on cancel.
                Err(_) if self.cancel.is_cancelled() => break LoopExit::Cancelled,
                Err(StreamError::Closed) => break LoopExit::SourceClosed,
                Err(StreamError::Io(e)) => break LoopExit::SourceFailed(e),
            }

            let rendered = self.renderer.render(&self.frame);
            if self.output.send(rendered).is_err() {
                break LoopExit::OutputClosed;
            }
            frames += 1;
        };

        match &exit {
            LoopExit::SourceFailed(_) => {
                log::info!("[{}] stopped after {} frames: {}", self.name, frames, exit)
            }
            _ => log::debug!("[{}] stopped after {} frames: {}", self.name, frames, exit),
        }

        LoopReport { frames, exit }
    }
}

impl<S: PixelStream + Send + 'static> RenderLoop<S> {
    /// Run the loop on its own named thread.
    pub fn spawn(self) -> io::Result<JoinHandle<LoopReport>> {
        thread::Builder::new()
            .name(format!("termvid-render-{}", self.name))
            .spawn(move || self.run())
    }
}
