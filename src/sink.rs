//! Log sink injected into every engine component.
//!
//! The binary uses [`TracingSink`], which forwards to the global `tracing`
//! subscriber (console + log file). Tests use [`RecordingSink`] to assert on
//! what was reported.

use std::sync::{Arc, Mutex};
use tracing::Level;

pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }
}

/// Forwards every line to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TracingSink {
    pub fn shared() -> Arc<dyn LogSink> {
        Arc::new(TracingSink)
    }
}

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        // tracing's macros need the level at compile time.
        if level == Level::ERROR {
            tracing::error!("{}", message);
        } else if level == Level::WARN {
            tracing::warn!("{}", message);
        } else if level == Level::INFO {
            tracing::info!("{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!("{}", message);
        } else {
            tracing::trace!("{}", message);
        }
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all recorded lines.
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Recorded lines at exactly `level`.
    pub fn at(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    /// True if any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, m)| m.contains(needle))
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: Level, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_levels() {
        let sink = RecordingSink::new();
        sink.info("configuring");
        sink.error("ninja failed");

        assert_eq!(sink.lines().len(), 2);
        assert_eq!(sink.at(Level::ERROR), vec!["ninja failed".to_string()]);
        assert!(sink.contains("configuring"));
        assert!(!sink.contains("uploading"));
    }
}
