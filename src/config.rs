//! Configuration file handling for termvid.
//!
//! Loads configuration from `<config dir>/termvid/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::frame::{FrameDimensions, FrameError, Region, RenderOffset, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::source::{self, RtspTransport};
use crate::stream::{DEFAULT_BACKLOG_FRAMES, MAX_BACKLOG_CAPACITY_FRAMES};

/// Configuration file structure for termvid.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    #[serde(default, rename = "stream")]
    pub streams: Vec<StreamConfig>,
}

#[derive(Debug, Deserialize)]
pub struct FfmpegConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
        }
    }
}

/// Where a stream's frames come from.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputConfig {
    /// V4L2 webcam.
    Webcam {
        #[serde(default = "default_device")]
        device: String,
    },
    /// File or network URL.
    Url {
        url: String,
        #[serde(default)]
        rtsp_transport: RtspTransport,
    },
    /// Raw ffmpeg input arguments, placed before the rawvideo output section.
    Args { args: Vec<String> },
}

impl InputConfig {
    /// ffmpeg input arguments for this source.
    pub fn ffmpeg_input(&self) -> Vec<String> {
        match self {
            InputConfig::Webcam { device } => source::webcam_input(device),
            InputConfig::Url {
                url,
                rtsp_transport,
            } => source::url_input(url, *rtsp_transport),
            InputConfig::Args { args } => args.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Label used in logs and thread names.
    #[serde(default)]
    pub name: Option<String>,
    pub input: InputConfig,
    #[serde(default = "default_width")]
    pub width: u16,
    #[serde(default = "default_height")]
    pub height: u16,
    #[serde(default)]
    pub offset_x: u16,
    #[serde(default)]
    pub offset_y: u16,
    /// Read-ahead held by the pump, in frames.
    #[serde(default = "default_backlog_frames")]
    pub backlog_frames: usize,
}

impl StreamConfig {
    /// A stream with default geometry at the top-left corner.
    pub fn new(input: InputConfig) -> Self {
        Self {
            name: None,
            input,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            offset_x: 0,
            offset_y: 0,
            backlog_frames: DEFAULT_BACKLOG_FRAMES,
        }
    }

    pub fn dimensions(&self) -> Result<FrameDimensions, FrameError> {
        FrameDimensions::new(self.width, self.height)
    }

    pub fn offset(&self) -> RenderOffset {
        RenderOffset::new(self.offset_x, self.offset_y)
    }

    /// Name for logs, falling back to the stream's position in the list.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("stream{}", index))
    }
}

fn default_binary() -> String {
    "ffmpeg".to_string()
}

fn default_device() -> String {
    source::DEFAULT_WEBCAM_DEVICE.to_string()
}

fn default_width() -> u16 {
    DEFAULT_WIDTH
}

fn default_height() -> u16 {
    DEFAULT_HEIGHT
}

/// Smallest backlog that can hold more than the 2 frames kept after trimming.
pub const MIN_BACKLOG_FRAMES: usize = 3;

fn default_backlog_frames() -> usize {
    DEFAULT_BACKLOG_FRAMES
}

/// Template written by `termvid config init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# termvid configuration

[ffmpeg]
# Path or name of the ffmpeg executable
binary = "ffmpeg"

# One [[stream]] table per video source. Streams must not overlap on screen:
# each covers `width` columns and `height / 2` rows starting at
# (offset_x, offset_y).

[[stream]]
name = "webcam"
input = { kind = "webcam", device = "/dev/video0" }
width = 80
height = 44     # must be even
offset_x = 0
offset_y = 0
backlog_frames = 4

# [[stream]]
# name = "rtsp"
# input = { kind = "url", url = "rtsp://camera.local/stream", rtsp_transport = "tcp" }
# offset_y = 24
"#;

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?;
            Ok(config)
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Check every stream's geometry and that no two streams share screen cells.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_streams(&self.streams)
    }
}

/// Validate a list of streams on its own, for streams built from the CLI.
pub fn validate_streams(streams: &[StreamConfig]) -> Result<(), ConfigError> {
    let mut regions = Vec::with_capacity(streams.len());

    for (index, stream) in streams.iter().enumerate() {
        let dims = stream.dimensions().map_err(|source| ConfigError::InvalidStream {
            stream: stream.label(index),
            source,
        })?;
        if !(MIN_BACKLOG_FRAMES..=MAX_BACKLOG_CAPACITY_FRAMES).contains(&stream.backlog_frames) {
            return Err(ConfigError::BacklogOutOfRange {
                stream: stream.label(index),
                frames: stream.backlog_frames,
            });
        }
        regions.push((stream.label(index), Region::of(dims, stream.offset())));
    }

    for (i, (first, a)) in regions.iter().enumerate() {
        for (second, b) in &regions[i + 1..] {
            if a.overlaps(b) {
                return Err(ConfigError::Overlap {
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Stream '{stream}': {source}")]
    InvalidStream { stream: String, source: FrameError },

    #[error(
        "Stream '{stream}': backlog_frames must be between {} and {} (got {frames})",
        MIN_BACKLOG_FRAMES,
        MAX_BACKLOG_CAPACITY_FRAMES
    )]
    BacklogOutOfRange { stream: String, frames: usize },

    #[error("Streams '{first}' and '{second}' overlap on screen")]
    Overlap { first: String, second: String },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("termvid").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/termvid/config.toml")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn webcam_at(offset_x: u16, offset_y: u16) -> StreamConfig {
        StreamConfig {
            offset_x,
            offset_y,
            ..StreamConfig::new(InputConfig::Webcam {
                device: default_device(),
            })
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.ffmpeg.binary, "ffmpeg");
        assert!(config.streams.is_empty());
    }

    #[test]
    fn test_default_template_parses_and_validates() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config.streams.len(), 1);
        assert_eq!(
            config.streams[0].input,
            InputConfig::Webcam {
                device: "/dev/video0".to_string()
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_load_two_streams() {
        let file = write_config(
            r#"
[ffmpeg]
binary = "/opt/ffmpeg/bin/ffmpeg"

[[stream]]
input = { kind = "webcam" }

[[stream]]
name = "lobby"
input = { kind = "url", url = "rtsp://cam/lobby", rtsp_transport = "tcp" }
width = 40
height = 20
offset_y = 30
"#,
        );
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.ffmpeg.binary, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.streams.len(), 2);

        let first = &config.streams[0];
        assert_eq!(first.width, 80);
        assert_eq!(first.height, 44);
        assert_eq!(first.backlog_frames, DEFAULT_BACKLOG_FRAMES);
        assert_eq!(first.label(0), "stream0");

        let second = &config.streams[1];
        assert_eq!(second.label(1), "lobby");
        assert_eq!(second.offset(), RenderOffset::new(0, 30));
        assert_eq!(
            second.input.ffmpeg_input(),
            vec!["-rtsp_transport", "tcp", "-i", "rtsp://cam/lobby"]
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_raw_args_input() {
        let file = write_config(
            r#"
[[stream]]
input = { kind = "args", args = ["-re", "-i", "clip.mp4"] }
"#,
        );
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(
            config.streams[0].input.ffmpeg_input(),
            vec!["-re", "-i", "clip.mp4"]
        );
    }

    #[test]
    fn test_parse_error_mentions_path() {
        let file = write_config("[[stream]]\nwidth = \"wide\"\n");
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_validate_rejects_odd_height() {
        let mut stream = webcam_at(0, 0);
        stream.height = 45;
        let err = validate_streams(&[stream]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidStream {
                source: FrameError::OddHeight(45),
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let err = validate_streams(&[webcam_at(0, 0), webcam_at(10, 10)]).unwrap_err();
        assert!(matches!(err, ConfigError::Overlap { .. }));
    }

    #[test]
    fn test_validate_accepts_stacked_streams() {
        // 44 source rows = 22 terminal rows starting at row 1.
        validate_streams(&[webcam_at(0, 0), webcam_at(0, 23)]).unwrap();
    }

    #[test]
    fn test_validate_rejects_small_backlog() {
        let mut stream = webcam_at(0, 0);
        stream.backlog_frames = 2;
        let err = validate_streams(&[stream]).unwrap_err();
        assert!(matches!(err, ConfigError::BacklogOutOfRange { frames: 2, .. }));
    }

    #[test]
    fn test_validate_rejects_huge_backlog() {
        let mut stream = webcam_at(0, 0);
        stream.backlog_frames = usize::MAX / 4;
        let err = validate_streams(&[stream]).unwrap_err();
        assert!(matches!(err, ConfigError::BacklogOutOfRange { .. }));

        let mut stream = webcam_at(0, 0);
        stream.backlog_frames = MAX_BACKLOG_CAPACITY_FRAMES;
        validate_streams(&[stream]).unwrap();
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = default_path();
        assert!(path.ends_with("termvid/config.toml"));
    }
}
