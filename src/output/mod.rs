//! Output formatting module
//!
//! Console reporting and summary formats for test results.

mod console;
mod formatter;

pub use console::ConsoleSink;
pub use formatter::{write_summary_to_file, OutputFormat, ResultFormatter};
