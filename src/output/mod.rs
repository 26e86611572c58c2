//! Console output utilities.

pub mod console;

pub use console::{print_error_line, print_summary, render_event_json, render_event_text};
