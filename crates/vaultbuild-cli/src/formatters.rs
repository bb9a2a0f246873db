//! Output helpers shared by the commands.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

/// Pretty-printed JSON.
pub fn json<T: Serialize>(data: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Byte count with a binary unit.
///
/// # Examples
///
/// ```
/// use vaultbuild_cli::formatters::human_size;
///
/// assert_eq!(human_size(512), "512 bytes");
/// assert_eq!(human_size(1536), "1.50 KB");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes < KB {
        format!("{bytes} bytes")
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}

/// Bold cyan title followed by a rule.
#[must_use]
pub fn heading(title: &str) -> String {
    format!("{}\n{}", title.bold().cyan(), "─".repeat(50))
}

/// `  Label: value` line.
#[must_use]
pub fn field(label: &str, value: impl std::fmt::Display) -> String {
    format!("  {} {value}", format!("{label}:").bold())
}
