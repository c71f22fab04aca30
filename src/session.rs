//! Wiring for a full run: sources, render loops and the display thread.
//!
//! Startup order matters: the display thread is started first so the
//! initial screen clear can be handed over before any stream renders.

use std::io::{self, Read, Write};
use std::thread::JoinHandle;

use crate::cancel::CancelToken;
use crate::channel::{output_channel, FormattedFrame, FrameSender};
use crate::config::{validate_streams, ConfigError, StreamConfig};
use crate::display::DisplayThread;
use crate::frame::{FrameDimensions, RenderOffset};
use crate::render::RESET;
use crate::render_loop::{LoopExit, LoopReport, RenderLoop};
use crate::source::{ffmpeg_args, FfmpegSource, SourceError};
use crate::stream::BacklogReader;

/// Errors that prevent a session from starting or finishing cleanly.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no streams configured")]
    NoStreams,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("stream '{stream}': {source}")]
    Source { stream: String, source: SourceError },

    #[error("stream '{stream}': backlog of {frames} frames does not fit in memory")]
    BacklogTooLarge { stream: String, frames: usize },

    #[error("terminal output failed: {0}")]
    Output(io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Geometry and buffering for one stream of a pipeline.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub label: String,
    pub dims: FrameDimensions,
    pub offset: RenderOffset,
    pub backlog_frames: usize,
}

impl StreamSpec {
    fn backlog_bytes(&self) -> Option<usize> {
        self.backlog_frames.checked_mul(self.dims.frame_size())
    }
}

/// What happened to each stream, and how much reached the terminal.
#[derive(Debug)]
pub struct SessionSummary {
    /// Writes performed by the display thread, including the screen clear.
    pub frames_written: u64,
    pub streams: Vec<(String, LoopReport)>,
}

/// Run already-open readers through the render pipeline into `writer`.
///
/// Returns once every render loop has stopped and the display thread has
/// drained the channel. If a stream fails to start, `cancel` is set and the
/// loops already running are joined before the error is returned.
pub fn run_pipeline<W>(
    inputs: Vec<(StreamSpec, Box<dyn Read + Send>)>,
    cancel: CancelToken,
    writer: W,
) -> Result<(SessionSummary, W), SessionError>
where
    W: Write + Send + 'static,
{
    if inputs.is_empty() {
        return Err(SessionError::NoStreams);
    }

    let (tx, rx) = output_channel();
    let display = DisplayThread::new(rx, writer).spawn()?;

    if tx.send(FormattedFrame::clear_screen()).is_err() {
        drop(tx);
        return Err(join_display(display).err().unwrap_or_else(|| {
            SessionError::Output(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "display thread exited",
            ))
        }));
    }

    let mut loops: Vec<(String, JoinHandle<LoopReport>)> = Vec::with_capacity(inputs.len());
    for (spec, reader) in inputs {
        match start_loop(spec, reader, &tx, &cancel) {
            Ok(started) => loops.push(started),
            Err(e) => {
                log::warn!("{}; stopping {} running streams", e, loops.len());
                cancel.cancel();
                drop(tx);
                join_loops(loops);
                if let Err(display_err) = join_display(display) {
                    log::debug!("Display thread also failed: {}", display_err);
                }
                return Err(e);
            }
        }
    }
    drop(tx);

    let streams = join_loops(loops);
    let outcome = join_display(display)?;
    Ok((
        SessionSummary {
            frames_written: outcome.frames,
            streams,
        },
        outcome.writer,
    ))
}

fn start_loop(
    spec: StreamSpec,
    reader: Box<dyn Read + Send>,
    output: &FrameSender,
    cancel: &CancelToken,
) -> Result<(String, JoinHandle<LoopReport>), SessionError> {
    let backlog_bytes = spec.backlog_bytes().ok_or_else(|| SessionError::BacklogTooLarge {
        stream: spec.label.clone(),
        frames: spec.backlog_frames,
    })?;
    let stream = BacklogReader::spawn(reader, spec.dims.frame_size(), spec.backlog_frames)?
        .with_cancel(cancel.clone());
    log::info!(
        "[{}] rendering {} at ({}, {}), backlog {} bytes",
        spec.label,
        spec.dims,
        spec.offset.x,
        spec.offset.y,
        backlog_bytes
    );
    let handle = RenderLoop::new(stream, spec.dims, spec.offset, output.clone(), cancel.clone())
        .with_name(spec.label.clone())
        .spawn()?;
    Ok((spec.label, handle))
}

fn join_loops(loops: Vec<(String, JoinHandle<LoopReport>)>) -> Vec<(String, LoopReport)> {
    loops
        .into_iter()
        .map(|(label, handle)| {
            let report = handle.join().unwrap_or_else(|_| {
                log::warn!("[{}] render thread panicked", label);
                LoopReport {
                    frames: 0,
                    exit: LoopExit::SourceFailed(io::Error::other("render thread panicked")),
                }
            });
            (label, report)
        })
        .collect()
}

fn join_display<W>(
    handle: JoinHandle<io::Result<crate::display::DisplayOutcome<W>>>,
) -> Result<crate::display::DisplayOutcome<W>, SessionError> {
    match handle.join() {
        Ok(result) => result.map_err(SessionError::Output),
        Err(_) => Err(SessionError::Output(io::Error::other("display thread panicked"))),
    }
}

/// A set of ffmpeg-backed streams rendered to stdout.
#[derive(Debug)]
pub struct Session {
    binary: String,
    streams: Vec<StreamConfig>,
    cancel: CancelToken,
}

impl Session {
    /// Validate `streams` and prepare a session using ffmpeg at `binary`.
    pub fn new(binary: impl Into<String>, streams: Vec<StreamConfig>) -> Result<Self, SessionError> {
        if streams.is_empty() {
            return Err(SessionError::NoStreams);
        }
        validate_streams(&streams)?;
        Ok(Self {
            binary: binary.into(),
            streams,
            cancel: CancelToken::new(),
        })
    }

    /// Token that stops every render loop of this session.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Spawn one ffmpeg per stream and render until all of them end.
    pub fn run(self) -> Result<SessionSummary, SessionError> {
        let mut sources = Vec::with_capacity(self.streams.len());
        let mut inputs: Vec<(StreamSpec, Box<dyn Read + Send>)> = Vec::new();

        for (index, stream) in self.streams.iter().enumerate() {
            let label = stream.label(index);
            // Validated in `new`.
            let dims = stream.dimensions().map_err(|source| ConfigError::InvalidStream {
                stream: label.clone(),
                source,
            })?;

            let args = ffmpeg_args(&stream.input.ffmpeg_input(), dims);
            let mut source = FfmpegSource::spawn(&self.binary, &args, &label).map_err(|source| {
                SessionError::Source {
                    stream: label.clone(),
                    source,
                }
            })?;
            let stdout = source.take_stdout().map_err(|source| SessionError::Source {
                stream: label.clone(),
                source,
            })?;

            inputs.push((
                StreamSpec {
                    label,
                    dims,
                    offset: stream.offset(),
                    backlog_frames: stream.backlog_frames,
                },
                Box::new(stdout),
            ));
            sources.push(source);
        }

        let result = run_pipeline(inputs, self.cancel.clone(), io::stdout());

        for source in &mut sources {
            if let Err(e) = source.shutdown() {
                log::warn!("[{}] ffmpeg shutdown failed: {}", source.label(), e);
            }
        }

        let (summary, mut stdout) = result?;
        restore_terminal(&mut stdout)?;
        Ok(summary)
    }
}

/// Reset colors and leave the cursor on a fresh line.
pub fn restore_terminal(out: &mut impl Write) -> io::Result<()> {
    out.write_all(RESET.as_bytes())?;
    out.write_all(b"\r\n")?;
    out.flush()
}
