//! Run and case timing
//!
//! Durations come from the monotonic clock; the wall-clock start is kept
//! alongside so reports can show when a run began.

use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::debug;

/// Labelled stopwatch started at a known wall-clock time
#[derive(Debug)]
pub struct Timer {
    label: String,
    started_at: DateTime<Utc>,
    start: Instant,
}

/// What a finished [`Timer`] measured
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timing {
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn finish(self) -> Timing {
        let duration_ms = self.elapsed_ms();
        debug!("{} took {}ms", self.label, duration_ms);
        Timing {
            label: self.label,
            started_at: self.started_at,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_timing_keeps_label_and_start() {
        let timer = Timer::start("suite");
        let started_at = timer.started_at();
        sleep(Duration::from_millis(10));

        let timing = timer.finish();
        assert_eq!(timing.label, "suite");
        assert_eq!(timing.started_at, started_at);
        assert!(timing.duration_ms >= 10);
    }
}
