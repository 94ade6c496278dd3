//! Query-wide runtime state shared by every scanner.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tuplescan_config::ScannerConfig;

/// Collects parse errors reported by scanners for later surfacing to
/// whoever runs the query.
///
/// Only the first `max_error_log` messages are kept; every error is counted.
#[derive(Debug)]
pub struct RuntimeState {
    max_error_log: usize,
    abort_on_error: bool,
    error_log: Mutex<Vec<String>>,
    num_parse_errors: AtomicU64,
}

impl RuntimeState {
    pub fn new(max_error_log: usize, abort_on_error: bool) -> Self {
        Self { max_error_log, abort_on_error, error_log: Mutex::new(Vec::new()), num_parse_errors: AtomicU64::new(0) }
    }

    pub fn from_config(config: &ScannerConfig) -> Self {
        Self::new(config.max_error_log, config.abort_on_error)
    }

    pub fn abort_on_error(&self) -> bool {
        self.abort_on_error
    }

    pub fn log_has_space(&self) -> bool {
        self.log().len() < self.max_error_log
    }

    /// Count a parse error and keep its message if the log has space.
    /// Returns whether the message was kept.
    pub fn log_error(&self, message: String) -> bool {
        self.num_parse_errors.fetch_add(1, Ordering::Relaxed);
        let mut log = self.log();
        if log.len() >= self.max_error_log {
            return false;
        }
        log.push(message);
        true
    }

    pub fn error_log(&self) -> Vec<String> {
        self.log().clone()
    }

    /// Parse errors reported across all scanners, logged or not.
    pub fn num_parse_errors(&self) -> u64 {
        self.num_parse_errors.load(Ordering::Relaxed)
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.error_log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::from_config(&ScannerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_bounded_but_count_is_not() {
        let state = RuntimeState::new(2, false);
        assert!(state.log_error("one".to_string()));
        assert!(state.log_has_space());
        assert!(state.log_error("two".to_string()));
        assert!(!state.log_has_space());
        assert!(!state.log_error("three".to_string()));
        assert_eq!(state.error_log(), ["one", "two"]);
        assert_eq!(state.num_parse_errors(), 3);
    }

    #[test]
    fn takes_policy_from_config() {
        let config = ScannerConfig { abort_on_error: true, max_error_log: 0, ..ScannerConfig::default() };
        let state = RuntimeState::from_config(&config);
        assert!(state.abort_on_error());
        assert!(!state.log_has_space());
    }
}
