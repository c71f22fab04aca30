//! FFmpeg source processes producing raw RGB frames.
//!
//! Each stream gets its own ffmpeg child. The caller supplies the input
//! half of the command line; the output half always asks for headerless
//! `rgb24` frames scaled to the stream's dimensions on stdout.

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::frame::FrameDimensions;

/// Default V4L2 webcam device.
pub const DEFAULT_WEBCAM_DEVICE: &str = "/dev/video0";

/// How long to wait for ffmpeg to exit after SIGINT before killing it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that can occur while managing an ffmpeg source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("ffmpeg not found (looked for '{0}'). Install ffmpeg or set [ffmpeg] binary in the config file")]
    FfmpegNotFound(String),

    #[error("failed to spawn ffmpeg: {0}")]
    SpawnFailed(std::io::Error),

    #[error("ffmpeg stdout was not captured")]
    NoStdout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport used for RTSP inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RtspTransport {
    #[default]
    Udp,
    Tcp,
}

impl RtspTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            RtspTransport::Udp => "udp",
            RtspTransport::Tcp => "tcp",
        }
    }
}

/// Input arguments for a V4L2 webcam delivering MJPEG.
pub fn webcam_input(device: &str) -> Vec<String> {
    [
        "-framerate",
        "60",
        "-video_size",
        "320x180",
        "-input_format",
        "mjpeg",
        "-i",
        device,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Input arguments for a file or network URL.
///
/// RTSP URLs get an explicit transport, the way live cameras usually need.
pub fn url_input(url: &str, transport: RtspTransport) -> Vec<String> {
    let mut args = Vec::new();
    if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
        args.push("-rtsp_transport".to_string());
        args.push(transport.as_str().to_string());
    }
    args.push("-i".to_string());
    args.push(url.to_string());
    args
}

/// Output arguments: raw rgb24 frames at `dims`, written to stdout.
pub fn raw_output_args(dims: FrameDimensions) -> Vec<String> {
    vec![
        "-f".to_string(),
        "rawvideo".to_string(),
        "-vf".to_string(),
        format!("scale={}x{},setsar=1:1", dims.width(), dims.height()),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "pipe:".to_string(),
    ]
}

/// Full ffmpeg argument list for one stream.
pub fn ffmpeg_args(input: &[String], dims: FrameDimensions) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];
    args.extend(input.iter().cloned());
    args.extend(raw_output_args(dims));
    args
}

/// A running ffmpeg process.
pub struct FfmpegSource {
    child: Child,
    label: String,
    stderr_thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FfmpegSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegSource")
            .field("label", &self.label)
            .field("pid", &self.child.id())
            .finish_non_exhaustive()
    }
}

impl FfmpegSource {
    /// Spawn `binary` with `args`, capturing stdout and stderr.
    ///
    /// stderr lines are forwarded to the log at debug level, tagged with
    /// `label`.
    pub fn spawn(binary: &str, args: &[String], label: &str) -> Result<Self, SourceError> {
        log::debug!("[{}] spawning {} {}", label, binary, args.join(" "));

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SourceError::FfmpegNotFound(binary.to_string())
                } else {
                    SourceError::SpawnFailed(e)
                }
            })?;

        let stderr_thread = match child.stderr.take() {
            Some(stderr) => {
                let tag = label.to_string();
                Some(
                    thread::Builder::new()
                        .name(format!("termvid-ffmpeg-{}", label))
                        .spawn(move || {
                            for line in BufReader::new(stderr).lines() {
                                match line {
                                    Ok(l) => log::debug!("[{}] ffmpeg: {}", tag, l),
                                    Err(_) => break,
                                }
                            }
                        })?,
                )
            }
            None => None,
        };

        let source = Self {
            child,
            label: label.to_string(),
            stderr_thread,
        };
        log::info!("[{}] ffmpeg started (pid {})", source.label, source.pid());
        Ok(source)
    }

    /// Take the stdout pipe carrying raw frames. Only the first call succeeds.
    pub fn take_stdout(&mut self) -> Result<ChildStdout, SourceError> {
        self.child.stdout.take().ok_or(SourceError::NoStdout)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stop ffmpeg: SIGINT first, then kill if it has not exited in time.
    pub fn shutdown(&mut self) -> Result<ExitStatus, SourceError> {
        if let Some(status) = self.child.try_wait()? {
            self.join_stderr();
            return Ok(status);
        }

        #[cfg(unix)]
        {
            // SAFETY: kill(2) with a pid we own; failure is reported via errno only.
            unsafe {
                libc::kill(self.child.id() as i32, libc::SIGINT);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }

        let start = Instant::now();
        let status = loop {
            match self.child.try_wait()? {
                Some(status) => break status,
                None if start.elapsed() > SHUTDOWN_TIMEOUT => {
                    log::warn!("[{}] ffmpeg ignored SIGINT, killing", self.label);
                    let _ = self.child.kill();
                    break self.child.wait()?;
                }
                None => thread::sleep(Duration::from_millis(50)),
            }
        };

        self.join_stderr();
        Ok(status)
    }

    fn join_stderr(&mut self) {
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.shutdown();
        }
    }
}
