//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::source::{RtspTransport, DEFAULT_WEBCAM_DEVICE};

/// Render live video as truecolor half-block text in the terminal
#[derive(Parser, Debug)]
#[command(name = "termvid")]
#[command(version, about = "Render live video in the terminal", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Streams from the config file (default webcam if none configured)
    termvid

    # A second camera below the first
    termvid webcam --device /dev/video2 -y 24

    # An RTSP feed over TCP, 120 columns wide
    termvid --width 120 --height 68 url rtsp://camera.local/stream --rtsp-transport tcp

    # Frames produced by any other program
    ffmpeg -i clip.mp4 -f rawvideo -vf scale=80x44 -pix_fmt rgb24 pipe: | termvid stdin

Set RUST_LOG=debug (and redirect stderr) to see ffmpeg output and stream events.")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Frame width in pixels (= terminal columns)
    #[arg(long, global = true)]
    pub width: Option<u16>,

    /// Frame height in pixels (two per terminal row, must be even)
    #[arg(long, global = true)]
    pub height: Option<u16>,

    /// Column at which the video is drawn
    #[arg(long, short = 'x', global = true)]
    pub offset_x: Option<u16>,

    /// Row at which the video is drawn
    #[arg(long, short = 'y', global = true)]
    pub offset_y: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render every stream from the config file (the default)
    Play,
    /// Render a V4L2 webcam
    Webcam {
        /// Video device
        #[arg(long, short, default_value = DEFAULT_WEBCAM_DEVICE)]
        device: String,
    },
    /// Render a file or network URL
    Url {
        /// Anything ffmpeg accepts as input (file path, rtsp://, http://, ...)
        url: String,

        /// Transport for rtsp:// URLs
        #[arg(long, value_enum, default_value_t = RtspTransport::Udp)]
        rtsp_transport: RtspTransport,
    },
    /// Render raw rgb24 frames read from stdin
    Stdin,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Create default config file
    Init,
}
