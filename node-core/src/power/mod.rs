//! Radio and sleep transitions around the wake cycle.
//!
//! The manager keeps the radio off until the join step asks for it and makes
//! sure the end of every cycle runs the same teardown: close the transport,
//! drop the association, radio off, then deep sleep. Radio-off always precedes
//! the sleep request so a sleep call that never takes effect leaves the node
//! idling with the transceiver unpowered.

use core::{fmt, time::Duration};

use crate::cycle::{CycleState, NetworkJoin, TelemetryTransport};

/// Board-level power controls.
pub trait PowerControl {
    /// Powers the wireless transceiver down.
    fn radio_off(&mut self);

    /// Powers the wireless transceiver up.
    fn radio_on(&mut self);

    /// Enters deep sleep, waking after `wake_after`.
    ///
    /// On hardware this does not return; the next observable event is a fresh
    /// start. Host implementations return so the cycle can be inspected.
    fn deep_sleep(&mut self, wake_after: Duration);
}

/// Power states a wake cycle moves through.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerState {
    RadioOff,
    Joining,
    Connected,
    DeepSleep,
}

impl PowerState {
    /// Returns `true` while the transceiver is powered.
    pub const fn radio_powered(self) -> bool {
        matches!(self, PowerState::Joining | PowerState::Connected)
    }

    /// Returns `true` when `next` is a legal successor of `self`.
    pub const fn can_transition_to(self, next: PowerState) -> bool {
        matches!(
            (self, next),
            (PowerState::RadioOff, PowerState::RadioOff | PowerState::Joining | PowerState::DeepSleep)
                | (PowerState::Joining, PowerState::Connected | PowerState::RadioOff)
                | (PowerState::Connected, PowerState::RadioOff)
                | (PowerState::DeepSleep, PowerState::RadioOff)
        )
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PowerState::RadioOff => "radio-off",
            PowerState::Joining => "radio-on/joining",
            PowerState::Connected => "radio-on/connected",
            PowerState::DeepSleep => "deep-sleep",
        };
        f.write_str(label)
    }
}

/// Attempted transition that the power state machine does not allow.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PowerTransitionError {
    pub from: PowerState,
    pub to: PowerState,
}

impl PowerTransitionError {
    pub const fn new(from: PowerState, to: PowerState) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for PowerTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal power transition {} -> {}", self.from, self.to)
    }
}

/// Owns the board power controls and tracks the cycle's power state.
pub struct PowerStateManager<P: PowerControl> {
    control: P,
    state: PowerState,
    transport_open: bool,
}

impl<P: PowerControl> PowerStateManager<P> {
    pub const fn new(control: P) -> Self {
        Self {
            control,
            state: PowerState::RadioOff,
            transport_open: false,
        }
    }

    /// Current power state.
    pub const fn state(&self) -> PowerState {
        self.state
    }

    /// Returns `true` while a transport session is open.
    pub const fn transport_open(&self) -> bool {
        self.transport_open
    }

    /// Provides access to the underlying controls.
    pub fn control(&self) -> &P {
        &self.control
    }

    /// Consumes the manager and returns the underlying controls.
    pub fn into_control(self) -> P {
        self.control
    }

    /// Forces the radio off to establish a known baseline at wake.
    pub fn begin_cycle(&mut self) {
        self.control.radio_off();
        self.state = PowerState::RadioOff;
        self.transport_open = false;
    }

    /// Powers the radio for the join step unless the cycle already failed.
    ///
    /// Returns `true` when the radio was switched on.
    pub fn enable_radio(&mut self, cycle: &CycleState) -> Result<bool, PowerTransitionError> {
        if cycle.failed() {
            return Ok(false);
        }
        self.transition(PowerState::Joining)?;
        self.control.radio_on();
        Ok(true)
    }

    /// Records that the network join completed.
    pub fn mark_joined(&mut self) -> Result<(), PowerTransitionError> {
        self.transition(PowerState::Connected)
    }

    /// Records that a transport session is open and must be closed at teardown.
    pub fn mark_transport_open(&mut self) {
        self.transport_open = true;
    }

    /// Runs the end-of-cycle teardown and requests deep sleep.
    ///
    /// Transport disconnect and network leave are best-effort; nothing they do
    /// can stop the radio-off and sleep requests from being issued.
    pub fn power_down<N, T>(&mut self, network: &mut N, transport: &mut T, wake_after: Duration)
    where
        N: NetworkJoin,
        T: TelemetryTransport,
    {
        if self.transport_open {
            transport.disconnect();
            self.transport_open = false;
        }
        if self.state.radio_powered() {
            network.leave();
        }

        self.control.radio_off();
        self.state = PowerState::RadioOff;

        self.state = PowerState::DeepSleep;
        self.control.deep_sleep(wake_after);
    }

    fn transition(&mut self, next: PowerState) -> Result<(), PowerTransitionError> {
        if self.state.can_transition_to(next) {
            self.state = next;
            Ok(())
        } else {
            Err(PowerTransitionError::new(self.state, next))
        }
    }
}
