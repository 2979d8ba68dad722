//! Diagnostic log setup
//!
//! The tool is usually started by dropping a file on it, so there is no
//! terminal to read. Everything goes to one append-only file instead.

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use crate::Result;
use crate::error::Error;

/// Route `tracing` output to `log_file`, timestamped, with source locations
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init(log_file: &Path) -> Result<()> {
    let appender = open_appender(log_file)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(appender)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| Error::Config(format!("Unable to install logger: {}", e)))
}

/// Single never-rotated file, opened in append mode
fn open_appender(log_file: &Path) -> Result<RollingFileAppender> {
    let file_name = log_file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::Config(format!("Invalid log file path {:?}", log_file)))?;
    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(|e| Error::Config(format!("Unable to open log file {:?}: {}", log_file, e)))
}
