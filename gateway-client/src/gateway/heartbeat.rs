//! Heartbeat timing.

use std::pin::Pin;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep_until, Instant, Sleep};

/// Jitter ceiling as a fraction of the base interval (10%).
pub const JITTER_DIVISOR: u128 = 10;

/// Draw a period in `[base, base * 1.1)`.
///
/// Works in whole nanoseconds so the upper bound stays strict; floating point
/// can round `base * (1 + 0.0999..)` up to exactly `base * 1.1`.
pub fn jittered_period<R: Rng + ?Sized>(base: Duration, rng: &mut R) -> Duration {
    let ceiling = base.as_nanos() / JITTER_DIVISOR;
    if ceiling == 0 {
        return base;
    }
    let ceiling = u64::try_from(ceiling).unwrap_or(u64::MAX);
    base + Duration::from_nanos(rng.gen_range(0..ceiling))
}

/// Periodic heartbeat timer owned by a connected session.
///
/// Dropping it cancels any pending tick.
#[derive(Debug)]
pub struct HeartbeatTimer {
    base: Duration,
    period: Duration,
    rejitter: bool,
    sleep: Pin<Box<Sleep>>,
}

impl HeartbeatTimer {
    /// Arm the timer. The first tick fires one jittered period from now.
    pub fn start(base: Duration, rejitter: bool) -> Self {
        let period = jittered_period(base, &mut rand::thread_rng());
        Self {
            base,
            period,
            rejitter,
            sleep: Box::pin(sleep_until(Instant::now() + period)),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Period of the upcoming tick.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick, then re-arm for the one after.
    ///
    /// The next deadline counts from when the tick is taken, not from the
    /// missed deadline, so a late tick never produces a burst of catch-up
    /// beats. Cancel safe: re-arming happens synchronously after the sleep
    /// completes.
    pub async fn tick(&mut self) {
        self.sleep.as_mut().await;

        if self.rejitter {
            self.period = jittered_period(self.base, &mut rand::thread_rng());
        }
        self.sleep.as_mut().reset(Instant::now() + self.period);
    }
}
