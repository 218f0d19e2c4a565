use std::time::Duration;

use naia_socket_shared::Instant;

/// Deadline arithmetic on the socket layer's `Instant`
pub trait InstantOffset {
    /// Copy of this instant moved `duration` forward, at millisecond precision
    fn offset(&self, duration: Duration) -> Instant;
}

impl InstantOffset for Instant {
    fn offset(&self, duration: Duration) -> Instant {
        let mut output = self.clone();
        let mut remaining = duration.as_millis();
        while remaining > 0 {
            let step = u32::try_from(remaining).unwrap_or(u32::MAX);
            output.add_millis(step);
            remaining -= u128::from(step);
        }
        output
    }
}
