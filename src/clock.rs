//! Time source for tick pacing.

use embassy_time::{Instant, Timer};

#[allow(async_fn_in_trait)]
pub trait TickClock {
    fn now(&self) -> Instant;

    /// Resolves at or after `deadline`. Returns at once if it already passed.
    async fn sleep_until(&mut self, deadline: Instant);
}

/// The embassy time driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyClock;

impl TickClock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        Timer::at(deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_time::Duration;

    #[test]
    fn sleeps_until_deadline() {
        let mut clock = EmbassyClock;
        let start = clock.now();
        let deadline = start + Duration::from_millis(20);

        block_on(clock.sleep_until(deadline));

        assert!(clock.now() >= deadline);
    }

    #[test]
    fn past_deadline_returns_immediately() {
        let mut clock = EmbassyClock;
        let start = clock.now();

        block_on(clock.sleep_until(start));

        assert!(clock.now() - start < Duration::from_millis(500));
    }
}
