//! Call contracts for the collaborators the wake cycle drives.
//!
//! Every fallible call resolves to a `Result` within a bounded time; the
//! associated error types only need `Debug` so their detail can be folded into
//! a diagnostic line.

use core::fmt::Debug;

use crate::config::{BrokerConfig, WifiCredentials};
use crate::sensor::SensorSample;

/// Environmental sensor attached to a peripheral bus.
pub trait SensorService {
    type Error: Debug;

    /// Probes and configures the device at `address`.
    fn init(&mut self, address: u8) -> Result<(), Self::Error>;

    /// Takes one measurement. Only meaningful after a successful [`init`].
    ///
    /// [`init`]: SensorService::init
    fn read(&mut self) -> SensorSample;
}

/// Association state reported by [`NetworkJoin::link_status`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkStatus {
    Idle,
    Joining,
    Connected,
    Failed,
}

/// Wireless association stack.
pub trait NetworkJoin {
    type Error: Debug;

    /// Starts associating with the access point. Returns once the request has
    /// been issued; progress is observed through [`link_status`].
    ///
    /// [`link_status`]: NetworkJoin::link_status
    fn begin_join(&mut self, credentials: &WifiCredentials<'_>) -> Result<(), Self::Error>;

    /// Reports the association state without blocking.
    fn link_status(&mut self) -> Result<LinkStatus, Self::Error>;

    /// Drops the association. Best-effort.
    fn leave(&mut self);
}

/// Publish/subscribe transport client.
pub trait TelemetryTransport {
    type Error: Debug;

    /// Opens a session with the broker over the joined network.
    fn connect(&mut self, broker: &BrokerConfig<'_>) -> Result<(), Self::Error>;

    /// Publishes `payload` to `topic`.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;

    /// Closes the session. Best-effort.
    fn disconnect(&mut self);
}
