//! Command-line interface definitions and helpers.

mod args;
mod commands;

pub use args::{Args, Command, ConfigAction};
pub use commands::{apply_geometry, handle_config_action, select_streams, stdin_spec};
