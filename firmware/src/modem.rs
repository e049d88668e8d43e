//! One Wi-Fi coprocessor serving both the join and the transport role.
//!
//! The cycle controller owns its network and transport services separately,
//! so each role gets a copy of a handle onto the same modem. The cycle is
//! single-threaded; the mutex only scopes the borrows.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use node_core::config::{BrokerConfig, WifiCredentials};
use node_core::cycle::{LinkStatus, NetworkJoin, TelemetryTransport};

use crate::diagnostics;

/// Storage for a modem shared between roles.
pub type ModemCell<M> = Mutex<NoopRawMutex, RefCell<M>>;

/// Handle onto a shared modem.
pub struct SharedModem<'a, M> {
    cell: &'a ModemCell<M>,
}

impl<M> Clone for SharedModem<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for SharedModem<'_, M> {}

impl<'a, M> SharedModem<'a, M> {
    pub const fn new(cell: &'a ModemCell<M>) -> Self {
        Self { cell }
    }

    fn with<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        self.cell.lock(|modem| f(&mut *modem.borrow_mut()))
    }
}

impl<M: NetworkJoin> NetworkJoin for SharedModem<'_, M> {
    type Error = M::Error;

    fn begin_join(&mut self, credentials: &WifiCredentials<'_>) -> Result<(), Self::Error> {
        self.with(|modem| modem.begin_join(credentials))
    }

    fn link_status(&mut self) -> Result<LinkStatus, Self::Error> {
        self.with(NetworkJoin::link_status)
    }

    fn leave(&mut self) {
        self.with(NetworkJoin::leave);
    }
}

impl<M: TelemetryTransport> TelemetryTransport for SharedModem<'_, M> {
    type Error = M::Error;

    fn connect(&mut self, broker: &BrokerConfig<'_>) -> Result<(), Self::Error> {
        self.with(|modem| modem.connect(broker))
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error> {
        self.with(|modem| modem.publish(topic, payload))?;
        diagnostics::log_published(topic, payload.len());
        Ok(())
    }

    fn disconnect(&mut self) {
        self.with(TelemetryTransport::disconnect);
    }
}
