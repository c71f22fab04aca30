//! Subcommand handlers and stream selection.

use std::error::Error;
use std::path::Path;

use super::args::{Args, Command, ConfigAction};
use crate::config::{default_path, Config, InputConfig, StreamConfig, DEFAULT_CONFIG_TOML};
use crate::frame::FrameError;
use crate::session::StreamSpec;

/// Apply `--width/--height/-x/-y` to a stream.
pub fn apply_geometry(stream: &mut StreamConfig, args: &Args) {
    if let Some(width) = args.width {
        stream.width = width;
    }
    if let Some(height) = args.height {
        stream.height = height;
    }
    if let Some(x) = args.offset_x {
        stream.offset_x = x;
    }
    if let Some(y) = args.offset_y {
        stream.offset_y = y;
    }
}

fn has_geometry(args: &Args) -> bool {
    args.width.is_some() || args.height.is_some() || args.offset_x.is_some() || args.offset_y.is_some()
}

/// Streams to render for `play`, `webcam` and `url`.
///
/// `play` uses the config file's streams, falling back to the default
/// webcam. Geometry flags apply to single-stream runs only.
pub fn select_streams(args: &Args, config: &Config) -> Vec<StreamConfig> {
    let single = |input: InputConfig| {
        let mut stream = StreamConfig::new(input);
        apply_geometry(&mut stream, args);
        vec![stream]
    };

    match &args.command {
        Some(Command::Webcam { device }) => single(InputConfig::Webcam {
            device: device.clone(),
        }),
        Some(Command::Url {
            url,
            rtsp_transport,
        }) => single(InputConfig::Url {
            url: url.clone(),
            rtsp_transport: *rtsp_transport,
        }),
        _ if config.streams.is_empty() => single(InputConfig::Webcam {
            device: crate::source::DEFAULT_WEBCAM_DEVICE.to_string(),
        }),
        _ => {
            let mut streams = config.streams.clone();
            if streams.len() == 1 {
                apply_geometry(&mut streams[0], args);
            } else if has_geometry(args) {
                log::warn!("Geometry flags are ignored when the config file defines several streams");
            }
            streams
        }
    }
}

/// Stream geometry for `termvid stdin`.
pub fn stdin_spec(args: &Args) -> Result<StreamSpec, FrameError> {
    let mut stream = StreamConfig::new(InputConfig::Args { args: Vec::new() });
    apply_geometry(&mut stream, args);
    Ok(StreamSpec {
        label: "stdin".to_string(),
        dims: stream.dimensions()?,
        offset: stream.offset(),
        backlog_frames: stream.backlog_frames,
    })
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load(Some(&config_path))?;
            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found, using defaults)", config_path.display());
            }
            println!("ffmpeg: {}", config.ffmpeg.binary);
            println!();

            if config.streams.is_empty() {
                println!("No streams configured; `termvid` renders {} by default.", crate::source::DEFAULT_WEBCAM_DEVICE);
            }
            for (index, stream) in config.streams.iter().enumerate() {
                println!("Stream '{}':", stream.label(index));
                println!("  Input:   {}", stream.input.ffmpeg_input().join(" "));
                println!("  Size:    {}x{}", stream.width, stream.height);
                println!("  Offset:  ({}, {})", stream.offset_x, stream.offset_y);
                println!("  Backlog: {} frames", stream.backlog_frames);
            }

            if let Err(e) = config.validate() {
                println!();
                println!("Warning: {}", e);
            }
            Ok(())
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(format!(
                    "Config file already exists: {}\nUse 'termvid config show' to view current settings.",
                    config_path.display()
                )
                .into());
            }

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&config_path, DEFAULT_CONFIG_TOML)?;

            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_run_uses_webcam_when_config_empty() {
        let args = Args::parse_from(["termvid"]);
        let streams = select_streams(&args, &Config::default());
        assert_eq!(streams.len(), 1);
        assert_eq!(
            streams[0].input,
            InputConfig::Webcam {
                device: "/dev/video0".to_string()
            }
        );
        assert_eq!((streams[0].width, streams[0].height), (80, 44));
    }

    #[test]
    fn test_url_command_applies_geometry() {
        let args = Args::parse_from(["termvid", "url", "clip.mp4", "--width", "40", "-y", "12"]);
        let streams = select_streams(&args, &Config::default());
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].width, 40);
        assert_eq!(streams[0].height, 44);
        assert_eq!(streams[0].offset_y, 12);
    }

    #[test]
    fn test_play_uses_configured_streams() {
        let config: Config = toml::from_str(
            r#"
[[stream]]
input = { kind = "webcam" }

[[stream]]
input = { kind = "url", url = "rtsp://cam" }
offset_y = 30
"#,
        )
        .unwrap();
        let args = Args::parse_from(["termvid", "play", "--width", "10"]);
        let streams = select_streams(&args, &config);
        assert_eq!(streams.len(), 2);
        // Ignored with several streams.
        assert_eq!(streams[0].width, 80);
    }

    #[test]
    fn test_stdin_spec_rejects_odd_height() {
        let args = Args::parse_from(["termvid", "stdin", "--height", "9"]);
        assert_eq!(stdin_spec(&args).unwrap_err(), FrameError::OddHeight(9));
    }

    #[test]
    fn test_config_init_writes_template_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        handle_config_action(ConfigAction::Init, Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG_TOML);

        let err = handle_config_action(ConfigAction::Init, Some(&path)).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
