//! Monotonic clock backed by the embassy time driver (TIM1).

use core::ops::Add;
use core::time::Duration;

use embassy_time::{Duration as EmbassyDuration, Instant};
use node_core::clock::Monotonic;

/// Embassy instant usable with `core::time::Duration` arithmetic.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl Add<Duration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.checked_add(to_embassy(rhs)).unwrap_or(Instant::MAX))
    }
}

/// Converts a core duration, saturating at the driver's range.
pub fn to_embassy(duration: Duration) -> EmbassyDuration {
    EmbassyDuration::from_micros(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
}

#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

impl EmbassyClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Monotonic for EmbassyClock {
    type Instant = FirmwareInstant;

    fn now(&self) -> Self::Instant {
        FirmwareInstant(Instant::now())
    }

    fn delay(&self, duration: Duration) {
        embassy_time::block_for(to_embassy(duration));
    }
}
