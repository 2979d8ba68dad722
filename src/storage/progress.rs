//! Human-readable sizes and transfer rates

use std::time::{Duration, Instant};

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Format a byte count with decimal (1000-based) units and one decimal
///
/// `force_bytes` skips scaling and prints the raw count.
pub fn format_size(bytes: u64, force_bytes: bool) -> String {
    if force_bytes {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value > 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Average rate for `bytes` moved in `elapsed`, over whole seconds
///
/// Under one second the byte count itself is reported as the rate.
pub fn format_rate(bytes: u64, elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    if seconds < 1 {
        return format!("{}/s", format_size(bytes, false));
    }
    format!("{}/s", format_size(bytes / seconds, false))
}

/// Measures the average transfer rate since its creation
#[derive(Debug, Clone, Copy)]
pub struct TransferRate {
    start: Instant,
}

impl TransferRate {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn rate(&self, bytes: u64) -> String {
        format_rate(bytes, self.start.elapsed())
    }
}
