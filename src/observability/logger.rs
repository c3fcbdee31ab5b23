//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` first, `severity` second, remaining keys sorted
//! - Synchronous, no buffering
//!
//! The engine never writes to a process stream on its own: every logger
//! carries an explicit sink, and the default sink discards everything.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::events::Event;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Per-stage detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Query failures
    Error = 3,
    /// Environment failures
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where log lines go
#[derive(Debug, Clone, Default)]
pub enum LogSink {
    /// Lines are dropped
    #[default]
    Disabled,
    /// Lines are written to standard error
    Stderr,
    /// Lines are kept in memory for the caller to inspect
    Memory(Arc<Mutex<Vec<String>>>),
}

/// Sink selector used in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Disabled,
    Stderr,
    Memory,
}

/// Logging section of the engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: Severity,
    pub sink: SinkKind,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Severity::Info,
            sink: SinkKind::Disabled,
        }
    }
}

/// A structured logger that outputs JSON lines to its sink
#[derive(Debug, Clone)]
pub struct Logger {
    sink: LogSink,
    level: Severity,
}

impl Default for Logger {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Logger {
    pub fn new(sink: LogSink, level: Severity) -> Self {
        Self { sink, level }
    }

    /// A logger that drops every line
    pub fn disabled() -> Self {
        Self::new(LogSink::Disabled, Severity::Info)
    }

    pub fn stderr(level: Severity) -> Self {
        Self::new(LogSink::Stderr, level)
    }

    /// A logger that keeps its lines; read them back with `captured`
    pub fn memory(level: Severity) -> Self {
        Self::new(LogSink::Memory(Arc::new(Mutex::new(Vec::new()))), level)
    }

    pub fn from_config(config: &LogConfig) -> Self {
        match config.sink {
            SinkKind::Disabled => Self::new(LogSink::Disabled, config.level),
            SinkKind::Stderr => Self::stderr(config.level),
            SinkKind::Memory => Self::memory(config.level),
        }
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    pub fn is_enabled(&self, severity: Severity) -> bool {
        !matches!(self.sink, LogSink::Disabled) && severity >= self.level
    }

    /// Lines captured by a memory sink, oldest first
    pub fn captured(&self) -> Vec<String> {
        match &self.sink {
            LogSink::Memory(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Log an event with the given severity and fields
    ///
    /// Fields are output in deterministic order (alphabetical by key)
    pub fn log(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !self.is_enabled(severity) {
            return;
        }
        let line = format_line(severity, event, fields);
        match &self.sink {
            LogSink::Disabled => {}
            LogSink::Stderr => {
                let mut stderr = io::stderr();
                let _ = stderr.write_all(line.as_bytes());
                let _ = stderr.flush();
            }
            LogSink::Memory(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(line);
                }
            }
        }
    }

    /// Log a typed lifecycle event at its own severity
    pub fn event(&self, event: Event, fields: &[(&str, &str)]) {
        self.log(event.severity(), event.as_str(), fields);
    }

    pub fn trace(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Trace, event, fields);
    }

    pub fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    pub fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    pub fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }

    pub fn fatal(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Fatal, event, fields);
    }
}

/// Renders one JSON log line, newline included
fn format_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(256);

    output.push('{');

    output.push_str("\"event\":\"");
    escape_json_string(&mut output, event);
    output.push('"');

    output.push_str(",\"severity\":\"");
    output.push_str(severity.as_str());
    output.push('"');

    let mut sorted_fields: Vec<_> = fields.iter().collect();
    sorted_fields.sort_by_key(|(k, _)| *k);

    for (key, value) in sorted_fields {
        output.push_str(",\"");
        escape_json_string(&mut output, key);
        output.push_str("\":\"");
        escape_json_string(&mut output, value);
        output.push('"');
    }

    output.push('}');
    output.push('\n');
    output
}

fn escape_json_string(output: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
}

#[cfg(test)]
pub(crate) fn capture_log(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    format_line(severity, event, fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_log_json_format() {
        let output = capture_log(Severity::Info, "QUERY_BEGIN", &[]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "QUERY_BEGIN");
        assert_eq!(parsed["severity"], "INFO");
    }

    #[test]
    fn test_stage_fields_sorted_by_key() {
        let shuffled = capture_log(
            Severity::Info,
            "STAGE_COMPLETE",
            &[("stage", "2"), ("op", "join"), ("rows_out", "17"), ("query_id", "q")],
        );
        let ordered = capture_log(
            Severity::Info,
            "STAGE_COMPLETE",
            &[("op", "join"), ("query_id", "q"), ("rows_out", "17"), ("stage", "2")],
        );
        assert_eq!(shuffled, ordered);

        let positions: Vec<usize> = ["\"op\"", "\"query_id\"", "\"rows_out\"", "\"stage\""]
            .iter()
            .map(|key| shuffled.find(key).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(shuffled.find("\"severity\"").unwrap() < positions[0]);
    }

    #[test]
    fn test_failure_reason_is_escaped() {
        let reason = "unknown column: \"l_nope\"\n\tat stage 1";
        let output = capture_log(Severity::Error, "QUERY_FAILED", &[("reason", reason)]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["reason"], reason);
        assert_eq!(parsed["severity"], "ERROR");
        assert!(output.ends_with("}\n"));
        assert_eq!(output.matches('\n').count(), 1);
    }

    #[test]
    fn test_memory_sink_respects_level() {
        let logger = Logger::memory(Severity::Warn);
        logger.info("DROPPED", &[]);
        logger.warn("KEPT", &[("rows", "3")]);
        let lines = logger.captured();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"event\":\"KEPT\""));
    }

    #[test]
    fn test_clones_share_memory_sink() {
        let logger = Logger::memory(Severity::Trace);
        let clone = logger.clone();
        clone.trace("FROM_CLONE", &[]);
        assert_eq!(logger.captured().len(), 1);
    }

    #[test]
    fn test_disabled_logger_captures_nothing() {
        let logger = Logger::disabled();
        assert!(!logger.is_enabled(Severity::Fatal));
        logger.fatal("IGNORED", &[]);
        assert!(logger.captured().is_empty());
    }
}
