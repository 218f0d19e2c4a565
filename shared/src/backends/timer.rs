use std::time::Duration;

use super::Instant;

/// Fixed-interval timer polled from the tick loop. Unlike the socket layer's
/// timer it reads the caller's `now` instead of the wall clock.
pub struct Timer {
    duration: Duration,
    last: Instant,
}

impl Timer {
    pub fn new(duration: Duration, now: &Instant) -> Self {
        Self {
            duration,
            last: now.clone(),
        }
    }

    pub fn reset(&mut self, now: &Instant) {
        self.last = now.clone();
    }

    pub fn ringing(&self, now: &Instant) -> bool {
        self.last.elapsed(now) >= self.duration
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}
