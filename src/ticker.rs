//! Restartable fixed-interval timer for the cooperative main loop

use std::time::{Duration, Instant};

/// Tracks when a periodic job is next due.
///
/// The main loop polls every ticker with the current instant; a ticker
/// never spawns threads or sleeps on its own.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Schedule the first tick one interval from `now`. Starting a
    /// running ticker keeps the existing schedule.
    pub fn start(&mut self, now: Instant) {
        if self.next_due.is_none() {
            self.next_due = Some(now + self.interval);
        }
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    /// True when the tick is due; reschedules from `now` when it fires.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }
}
