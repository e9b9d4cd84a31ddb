//! Error budget and trace-level-gated diagnostics
//!
//! Parse anomalies are soft: each one charges the configured error budget
//! and emits a warning when the trace level permits. Exhausting the budget
//! is fatal. When warnings were suppressed (trace level below `Warning`),
//! a one-shot summary notification is emitted on the first fatal path or
//! when the reader is dropped, so quiet runs still learn that the input
//! was not clean.

use log::warn;

use crate::error::{Result, TextFeedError};
use crate::types::TraceLevel;

pub(crate) struct Diagnostics {
    /// Display name of the input file, used in every message
    file: String,
    trace_level: TraceLevel,
    errors_left: usize,
    had_warnings: bool,
    notified: bool,
}

impl Diagnostics {
    pub(crate) fn new(file: String, trace_level: TraceLevel, max_allowed_errors: usize) -> Self {
        Self {
            file,
            trace_level,
            errors_left: max_allowed_errors,
            had_warnings: false,
            notified: false,
        }
    }

    pub(crate) fn file(&self) -> &str {
        &self.file
    }

    pub(crate) fn trace_level(&self) -> TraceLevel {
        self.trace_level
    }

    /// Record a parse anomaly at the given absolute file offset.
    ///
    /// The message closure runs only when the trace level permits emission,
    /// so callers can format freely on the warning path without paying for
    /// it on quiet runs. The `had_warnings` flag is set either way.
    pub(crate) fn warn_at<F>(&mut self, offset: u64, message: F)
    where
        F: FnOnce() -> String,
    {
        self.had_warnings = true;
        if self.trace_level >= TraceLevel::Warning {
            warn!(
                "{} at offset {} in the input file ({})",
                message(),
                offset,
                self.file
            );
        }
    }

    /// Charge one unit of the error budget; fatal once it is spent.
    pub(crate) fn count_error(&mut self) -> Result<()> {
        if self.errors_left == 0 {
            self.warning_notification();
            return Err(TextFeedError::ErrorBudgetExhausted {
                file: self.file.clone(),
            });
        }
        self.errors_left -= 1;
        Ok(())
    }

    /// One-shot notice that warnings were generated but suppressed.
    pub(crate) fn warning_notification(&mut self) {
        if self.had_warnings && self.trace_level < TraceLevel::Warning && !self.notified {
            self.notified = true;
            warn!(
                "A number of warnings were generated while reading input data ({}), \
                 to see them please raise the trace level to Warning or above.",
                self.file
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_counts_down_then_fails() {
        let mut diag = Diagnostics::new("test.txt".to_string(), TraceLevel::Error, 2);
        assert!(diag.count_error().is_ok());
        assert!(diag.count_error().is_ok());
        let err = diag.count_error().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Reached the maximum number of allowed errors \
             while reading the input file (test.txt)."
        );
    }

    #[test]
    fn zero_budget_fails_immediately() {
        let mut diag = Diagnostics::new("test.txt".to_string(), TraceLevel::Error, 0);
        assert!(matches!(
            diag.count_error(),
            Err(TextFeedError::ErrorBudgetExhausted { .. })
        ));
    }

    #[test]
    fn warnings_are_recorded_even_when_suppressed() {
        let mut diag = Diagnostics::new("test.txt".to_string(), TraceLevel::Error, 0);
        diag.warn_at(17, || "something odd".to_string());
        assert!(diag.had_warnings);
    }
}
