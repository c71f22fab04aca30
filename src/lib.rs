//! termvid library crate.
//!
//! Renders raw RGB video streams as truecolor half-block text:
//!
//! - [`stream`] extracts whole frames, dropping stale ones under backlog
//! - [`render`] turns a frame into a positioned escape-sequence string
//! - [`render_loop`] runs extract/render/send for one source
//! - [`channel`] hands rendered frames to the single [`display`] writer
//!
//! [`source`], [`config`], [`session`] and [`cli`] wire these to ffmpeg
//! processes and the command line.

pub mod cancel;
pub mod channel;
pub mod cli;
pub mod config;
pub mod display;
pub mod frame;
pub mod render;
pub mod render_loop;
pub mod session;
pub mod source;
pub mod stream;

pub use cancel::CancelToken;
pub use channel::{output_channel, FormattedFrame, FrameReceiver, FrameSender};
pub use display::DisplayThread;
pub use frame::{FrameBuffer, FrameDimensions, RenderOffset};
pub use render::FrameRenderer;
pub use render_loop::{LoopExit, LoopReport, RenderLoop};
pub use stream::{extract_frame, trim_backlog, BacklogReader, PixelStream, StreamError};
