//! ObservationScope for automatic begin/complete logging
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` with the elapsed time on `complete`
//! - Logs `{name}_FAILED` on `fail`
//! - Logs `{name}_INCOMPLETE` if dropped without either

use std::cell::Cell;
use std::time::Instant;

use super::logger::{Logger, Severity};

/// A scope that logs the lifecycle of one unit of work
///
/// # Usage
///
/// ```ignore
/// let scope = ObservationScope::with_fields(&logger, "STAGE", &[("op", "filter")]);
/// // ... do work ...
/// scope.complete_with_fields(&[("rows_out", "42")]);
/// ```
///
/// Fields given at creation are repeated on every later line of the scope.
pub struct ObservationScope<'a> {
    logger: &'a Logger,
    name: &'a str,
    completed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
    timer: Timer,
}

impl<'a> ObservationScope<'a> {
    /// Logs `{name}_BEGIN` immediately
    pub fn new(logger: &'a Logger, name: &'a str) -> Self {
        Self::with_fields(logger, name, &[])
    }

    pub fn with_fields(logger: &'a Logger, name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        let scope = Self {
            logger,
            name,
            completed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            timer: Timer::new(),
        };
        scope.emit(Severity::Info, "BEGIN", &[]);
        scope
    }

    fn emit(&self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        if !self.logger.is_enabled(severity) {
            return;
        }
        let event = format!("{}_{}", self.name, suffix);
        let mut all_fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all_fields.extend(extra.iter().copied());
        self.logger.log(severity, &event, &all_fields);
    }

    /// Logs `{name}_COMPLETE` at INFO level
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.completed.set(true);
        let elapsed = self.timer.elapsed_us();
        let mut fields: Vec<(&str, &str)> = vec![("elapsed_us", elapsed.as_str())];
        fields.extend(extra_fields.iter().copied());
        self.emit(Severity::Info, "COMPLETE", &fields);
    }

    /// Logs `{name}_FAILED` at ERROR level
    pub fn fail(self, code: &str, reason: &str) {
        self.completed.set(true);
        self.emit(Severity::Error, "FAILED", &[("code", code), ("reason", reason)]);
    }

    /// Logs `{name}_FAILED` at FATAL level
    pub fn fail_fatal(self, code: &str, reason: &str) {
        self.completed.set(true);
        self.emit(Severity::Fatal, "FAILED", &[("code", code), ("reason", reason)]);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            self.emit(
                Severity::Warn,
                "INCOMPLETE",
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// A simple duration timer for logging elapsed time
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed microseconds as a string
    pub fn elapsed_us(&self) -> String {
        self.start.elapsed().as_micros().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
