//! Stage timing.

use std::time::{Duration, Instant};

use crate::sink::LogSink;

/// Measures one stage and reports the elapsed time when finished.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    /// Start a new timer with the given stage name.
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Finish the timer and log the elapsed time.
    pub fn finish(self, sink: &dyn LogSink) {
        let elapsed = self.start.elapsed();
        sink.info(&format!("[{}] {}", format_elapsed(elapsed), self.name));
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_elapsed(Duration::from_secs(90)), "1.5m");
    }

    #[test]
    fn test_finish_logs_name() {
        let sink = RecordingSink::new();
        Timer::start("compile").finish(sink.as_ref());
        assert!(sink.contains("compile"));
    }
}
