//! Rendering of engine errors and warnings.
//!
//! Each message becomes a self-contained text block: the message, its
//! location, a few lines of source around it with a caret under the
//! reported span, and for errors a hex dump of the bytes near the column.

use std::fmt;
use vaultbuild_engine::{EngineMessage, MessageLocation};

const CONTEXT_LINES: usize = 2;
const HEX_ROW: usize = 16;
const HEX_WINDOW: usize = 32;

/// Severity of an engine message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Build-failing error
    Error,
    /// Non-fatal warning
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
        })
    }
}

/// Renders one message.
///
/// `source` is the full text of the file the message points into, when it
/// is known; without it only the reported line is shown.
///
/// # Examples
///
/// ```
/// use vaultbuild_build::diagnostics::{Severity, render};
/// use vaultbuild_core::Namespace;
/// use vaultbuild_engine::{EngineMessage, MessageLocation};
///
/// let mut message = EngineMessage::new("Unexpected token");
/// message.location = Some(MessageLocation {
///     file: "main.ts".into(),
///     namespace: Namespace::ProjectFile,
///     line: 1,
///     column: 4,
///     length: 1,
///     line_text: "let = 1;".into(),
/// });
/// let text = render(Severity::Warning, &message, None);
/// assert!(text.contains("main.ts:1:4"));
/// assert!(text.contains("    ^"));
/// ```
#[must_use]
pub fn render(severity: Severity, message: &EngineMessage, source: Option<&str>) -> String {
    let mut out = format!("[{severity}] {}", message.text);
    if let Some(plugin) = &message.plugin {
        out.push_str(&format!(" [plugin {plugin}]"));
    }
    out.push('\n');

    let Some(location) = &message.location else {
        return out;
    };
    out.push_str(&format!(
        "\n  {}:{}:{} ({})\n",
        location.file, location.line, location.column, location.namespace
    ));
    if location.line == 0 {
        return out;
    }
    for line in snippet(location, source) {
        out.push_str(&line);
        out.push('\n');
    }
    if severity == Severity::Error {
        out.push_str(&format!(
            "\n  Bytes around line {} column {}:\n",
            location.line, location.column
        ));
        for line in hex_dump(&location.line_text, location.column) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// One-line form used in notifications: `file:line:col: text`.
#[must_use]
pub fn headline(message: &EngineMessage) -> String {
    match &message.location {
        Some(at) => format!("{}:{}:{}: {}", at.file, at.line, at.column, message.text),
        None => message.text.clone(),
    }
}

fn snippet(location: &MessageLocation, source: Option<&str>) -> Vec<String> {
    let target = to_usize(location.line);
    let lines: Vec<&str> = source.map(|text| text.lines().collect()).unwrap_or_default();
    let (first, last) = if target <= lines.len() {
        (
            target.saturating_sub(CONTEXT_LINES).max(1),
            target.saturating_add(CONTEXT_LINES).min(lines.len()),
        )
    } else {
        (target, target)
    };
    let width = last.to_string().len();

    let mut out = Vec::new();
    for number in first..=last {
        let text = if number == target {
            location.line_text.as_str()
        } else {
            lines.get(number - 1).copied().unwrap_or_default()
        };
        let marker = if number == target { '>' } else { ' ' };
        out.push(format!("  {marker} {number:>width$} | {text}"));
        if number == target {
            out.push(format!("    {:>width$} | {}", "", caret(location)));
        }
    }
    out
}

/// Padding that keeps tabs so the caret lines up under the column.
///
/// The span never runs past the end of the line.
fn caret(location: &MessageLocation) -> String {
    let column = to_usize(location.column);
    let mut marker: String = location
        .line_text
        .chars()
        .take(column)
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
    let remaining = location.line_text.chars().count().saturating_sub(column);
    let span = to_usize(location.length).min(remaining).max(1);
    marker.push_str(&"^".repeat(span));
    marker
}

fn hex_dump(line_text: &str, column: u32) -> Vec<String> {
    let bytes = line_text.as_bytes();
    if bytes.is_empty() {
        return vec!["    (empty line)".to_string()];
    }
    let at = line_text
        .char_indices()
        .nth(to_usize(column))
        .map_or(bytes.len(), |(index, _)| index);
    let start = at.saturating_sub(HEX_WINDOW / 2) / HEX_ROW * HEX_ROW;
    let end = (at + HEX_WINDOW / 2).min(bytes.len());

    (start..end)
        .step_by(HEX_ROW)
        .map(|row_start| {
            let row = &bytes[row_start..(row_start + HEX_ROW).min(end)];
            let hex: Vec<String> = row.iter().map(|byte| format!("{byte:02x}")).collect();
            let ascii: String = row
                .iter()
                .map(|&byte| {
                    if byte.is_ascii_graphic() || byte == b' ' {
                        char::from(byte)
                    } else {
                        '.'
                    }
                })
                .collect();
            format!("    {row_start:04x}  {:<47}  |{ascii}|", hex.join(" "))
        })
        .collect()
}

fn to_usize(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
