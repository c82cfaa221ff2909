use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing and volume figures the transport collected for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Number of redirects that were followed.
    pub redirect_count: u32,

    pub bytes_sent: u64,
    pub bytes_received: u64,

    /// Time from task start to the response head, in milliseconds.
    pub time_to_first_byte_ms: Option<u64>,
}

impl TaskMetrics {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            redirect_count: 0,
            bytes_sent: 0,
            bytes_received: 0,
            time_to_first_byte_ms: None,
        }
    }

    #[must_use]
    pub fn finished(mut self, finished_at: DateTime<Utc>) -> Self {
        self.finished_at = finished_at;
        self
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at).to_std().unwrap_or_default()
    }

    /// Average receive rate in bytes per second.
    pub fn average_rate_bps(&self) -> Option<f64> {
        let secs = self.duration().as_secs_f64();
        (secs > 0.0).then(|| self.bytes_received as f64 / secs)
    }
}
