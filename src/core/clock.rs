use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Virtual time shared by every component of one simulated deployment.
///
/// Latencies are charged here instead of being slept; `time_scale`
/// optionally mirrors them on the wall clock so a run can be watched.
#[derive(Debug, Clone)]
pub struct SimClock {
    start: DateTime<Utc>,
    elapsed_ms: f64,
    time_scale: f64,
}

impl SimClock {
    pub fn new(start: DateTime<Utc>, time_scale: f64) -> Self {
        Self {
            start,
            elapsed_ms: 0.0,
            time_scale: time_scale.max(0.0),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.start + ChronoDuration::microseconds((self.elapsed_ms * 1000.0) as i64)
    }

    pub fn since(&self, start_ms: f64) -> f64 {
        self.elapsed_ms - start_ms
    }

    pub async fn advance(&mut self, ms: f64) {
        if !(ms > 0.0) {
            return;
        }
        self.elapsed_ms += ms;
        if self.time_scale > 0.0 {
            let wall = Duration::from_secs_f64(ms * self.time_scale / 1000.0);
            tokio::time::sleep(wall).await;
        }
    }

    /// Move forward without sleeping, e.g. over idle hours. Never goes back.
    pub fn jump_to(&mut self, ms: f64) {
        if ms > self.elapsed_ms {
            self.elapsed_ms = ms;
        }
    }
}
