//! Monotonic time source used for every bounded wait in the wake cycle.

use core::{ops::Add, time::Duration};

/// Monotonic clock plus a blocking delay.
///
/// Instants only need ordering and addition so both the firmware tick counter
/// and host-side mock instants fit behind the same bound.
pub trait Monotonic {
    /// Timestamp type produced by [`Monotonic::now`].
    type Instant: Copy + Ord + Add<Duration, Output = Self::Instant>;

    /// Returns the current instant.
    fn now(&self) -> Self::Instant;

    /// Blocks the caller for roughly `duration`.
    fn delay(&self, duration: Duration);

    /// Computes a deadline `timeout` after the current instant.
    fn deadline_after(&self, timeout: Duration) -> Self::Instant {
        self.now() + timeout
    }

    /// Returns `true` once `deadline` has been reached.
    fn has_elapsed(&self, deadline: Self::Instant) -> bool {
        self.now() >= deadline
    }
}

impl<T> Monotonic for &T
where
    T: Monotonic + ?Sized,
{
    type Instant = T::Instant;

    fn now(&self) -> Self::Instant {
        (**self).now()
    }

    fn delay(&self, duration: Duration) {
        (**self).delay(duration);
    }
}
