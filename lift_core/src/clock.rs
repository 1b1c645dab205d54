//! Wall-clock access for the session engine.
//!
//! The engine never reads the system time directly; it asks an injected
//! [`Clock`]. Tests use [`ManualClock`] to move time forward explicitly.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Source of the current time
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = *now + by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Accumulates running time across pause/resume cycles
#[derive(Clone, Copy, Debug)]
pub struct Stopwatch {
    accumulated: Duration,
    running_since: Option<DateTime<Utc>>,
}

impl Stopwatch {
    /// A stopwatch that has never run
    pub fn idle() -> Self {
        Self {
            accumulated: Duration::zero(),
            running_since: None,
        }
    }

    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            accumulated: Duration::zero(),
            running_since: Some(now),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Bank the current span and stop counting. No-op when already stopped.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if let Some(since) = self.running_since.take() {
            self.accumulated = self.accumulated + span(since, now);
        }
    }

    /// Start a new span from `now`. No-op when already running.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + span(since, now),
            None => self.accumulated,
        }
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from(self.elapsed(now).num_seconds()).unwrap_or(0)
    }
}

/// Span between two instants, never negative if the clock stepped back
fn span(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).max(Duration::zero())
}
