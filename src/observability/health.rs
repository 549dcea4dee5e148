use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

static PROCESS_STARTED: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic uptime source
#[derive(Debug, Clone, Copy)]
pub struct ProcessClock {
    started: Instant,
}

impl ProcessClock {
    /// Clock anchored at its first use in this process; touch it early in `main`
    pub fn process() -> Self {
        Self {
            started: *PROCESS_STARTED,
        }
    }

    /// Clock anchored at the moment of the call
    pub fn starting_now() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Liveness facts: answers "is the process up", never touches dependencies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessStatus {
    pub ok: bool,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

impl LivenessStatus {
    pub fn current(clock: &ProcessClock) -> Self {
        Self {
            ok: true,
            uptime_seconds: clock.uptime().as_secs(),
            timestamp: Utc::now(),
        }
    }
}
