//! Bounded wait for the wireless network join.
//!
//! The deadline is taken from the monotonic clock once, before the join
//! request goes out, and every poll compares against that fixed instant. The
//! wait resolves on the first of: link connected, link failed, deadline
//! reached.

use core::{fmt, time::Duration};

use crate::clock::Monotonic;
use crate::config::WifiCredentials;
use crate::cycle::{LinkStatus, NetworkJoin};

/// Reason a join did not reach the connected state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoinError<E> {
    /// The join service reported an error while starting or polling.
    Service(E),
    /// The access point refused the association.
    LinkFailed,
    /// The deadline passed before the link came up.
    TimedOut,
}

impl<E: fmt::Debug> fmt::Display for JoinError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Service(err) => write!(f, "join service error {err:?}"),
            JoinError::LinkFailed => f.write_str("access point rejected association"),
            JoinError::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Issues the join request and polls until connected, failed, or `timeout`
/// has elapsed since entry.
pub fn wait_for_join<N, C>(
    network: &mut N,
    clock: &C,
    credentials: &WifiCredentials<'_>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), JoinError<N::Error>>
where
    N: NetworkJoin,
    C: Monotonic,
{
    let deadline = clock.deadline_after(timeout);
    network
        .begin_join(credentials)
        .map_err(JoinError::Service)?;

    loop {
        match network.link_status().map_err(JoinError::Service)? {
            LinkStatus::Connected => return Ok(()),
            LinkStatus::Failed => return Err(JoinError::LinkFailed),
            LinkStatus::Idle | LinkStatus::Joining => {}
        }

        if clock.has_elapsed(deadline) {
            return Err(JoinError::TimedOut);
        }
        clock.delay(poll_interval);
    }
}
