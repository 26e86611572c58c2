//! Command-line interface module.

pub mod args;

pub use args::{Cli, Command, DownloadArgs, GuiArgs, LoginArgs, OutputFormat};
