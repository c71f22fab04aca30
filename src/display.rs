//! The display thread: sole writer of video output to the terminal.

use std::io::{self, Write};
use std::thread::{self, JoinHandle};

use crate::channel::FrameReceiver;

/// Result of a display thread that ran until its channel closed.
#[derive(Debug)]
pub struct DisplayOutcome<W> {
    /// Number of frames written.
    pub frames: u64,
    pub writer: W,
}

/// Writes every received frame to `writer`, one whole frame per write.
///
/// Frames are never split or merged, so escape sequences from different
/// streams cannot interleave.
#[derive(Debug)]
pub struct DisplayThread<W> {
    receiver: FrameReceiver,
    writer: W,
}

impl<W: Write> DisplayThread<W> {
    pub fn new(receiver: FrameReceiver, writer: W) -> Self {
        Self { receiver, writer }
    }

    /// Write frames in receipt order until every sender has been dropped.
    ///
    /// # Errors
    /// Returns the first write or flush error; the thread stops there.
    pub fn run(mut self) -> io::Result<DisplayOutcome<W>> {
        let mut frames = 0u64;
        for frame in self.receiver.iter() {
            self.writer.write_all(frame.as_bytes())?;
            self.writer.flush()?;
            frames += 1;
        }
        log::debug!("Display channel closed after {} frames", frames);
        Ok(DisplayOutcome {
            frames,
            writer: self.writer,
        })
    }
}

impl<W: Write + Send + 'static> DisplayThread<W> {
    /// Run on a dedicated thread.
    pub fn spawn(self) -> io::Result<JoinHandle<io::Result<DisplayOutcome<W>>>> {
        thread::Builder::new()
            .name("termvid-display".to_string())
            .spawn(move || self.run())
    }
}

impl DisplayThread<io::Stdout> {
    /// Display thread over stdout. Each `write_all` holds the stdout lock
    /// for the whole frame.
    pub fn stdout(receiver: FrameReceiver) -> Self {
        Self::new(receiver, io::stdout())
    }
}
