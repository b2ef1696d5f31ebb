//! Terminal formatting for command results

use crate::OutputFormat;
use serde::Serialize;

/// Print `value` as pretty JSON or through its `Display` impl
pub fn print_output<T: Serialize + std::fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Human => println!("{}", value),
    }
    Ok(())
}

pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

/// Mean rate over a transfer, `None` when it took no measurable time
pub fn average_speed(bytes: u64, elapsed_ms: i64) -> Option<u64> {
    if elapsed_ms <= 0 || bytes == 0 {
        return None;
    }
    Some((bytes as u128 * 1000 / elapsed_ms as u128) as u64)
}

/// Wall-clock time of a transfer: `850ms`, `12.4s`, `3m 05s`, `1h 02m`
pub fn format_elapsed(elapsed_ms: i64) -> String {
    let ms = elapsed_ms.max(0);
    if ms < 1000 {
        return format!("{}ms", ms);
    }
    let secs = ms / 1000;
    match secs {
        0..=59 => format!("{:.1}s", ms as f64 / 1000.0),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}
