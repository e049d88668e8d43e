//! Single wake cycle: sensor init, join, connect, read, publish, then sleep.
//!
//! The steps run as a short-circuiting pipeline. The first failure latches the
//! cycle state, brings the diagnostic sink up (once), and skips every later
//! step. Power-down runs afterwards regardless of how far the pipeline got.

mod services;

use core::fmt;

pub use services::{LinkStatus, NetworkJoin, SensorService, TelemetryTransport};

use crate::clock::Monotonic;
use crate::config::NodeConfig;
use crate::diagnostics::{DiagnosticSink, compose};
use crate::join::{JoinError, wait_for_join};
use crate::power::{PowerControl, PowerState, PowerStateManager};
use crate::telemetry::SensorReading;

/// Steps of the wake cycle, in execution order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleStep {
    SensorInit,
    NetworkJoin,
    TransportConnect,
    SensorRead,
    Publish,
}

impl CycleStep {
    /// All steps in execution order.
    pub const ALL: [CycleStep; 5] = [
        CycleStep::SensorInit,
        CycleStep::NetworkJoin,
        CycleStep::TransportConnect,
        CycleStep::SensorRead,
        CycleStep::Publish,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            CycleStep::SensorInit => "sensor-init",
            CycleStep::NetworkJoin => "network-join",
            CycleStep::TransportConnect => "transport-connect",
            CycleStep::SensorRead => "sensor-read",
            CycleStep::Publish => "publish",
        }
    }
}

impl fmt::Display for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the network join step failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoinFailure {
    /// The join service refused the request or stopped responding.
    Rejected,
    /// The access point refused the association.
    LinkFailed,
    /// No link before the join timeout.
    TimedOut,
}

/// First failure recorded in a wake cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleFailure {
    PeripheralInit,
    NetworkJoin(JoinFailure),
    TransportConnect,
    TransportPublish,
}

impl CycleFailure {
    /// Step the failure belongs to.
    pub const fn step(self) -> CycleStep {
        match self {
            CycleFailure::PeripheralInit => CycleStep::SensorInit,
            CycleFailure::NetworkJoin(_) => CycleStep::NetworkJoin,
            CycleFailure::TransportConnect => CycleStep::TransportConnect,
            CycleFailure::TransportPublish => CycleStep::Publish,
        }
    }
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleFailure::PeripheralInit => f.write_str("sensor initialisation failed"),
            CycleFailure::NetworkJoin(JoinFailure::Rejected) => {
                f.write_str("network join rejected")
            }
            CycleFailure::NetworkJoin(JoinFailure::LinkFailed) => {
                f.write_str("network link failed")
            }
            CycleFailure::NetworkJoin(JoinFailure::TimedOut) => {
                f.write_str("network join timed out")
            }
            CycleFailure::TransportConnect => f.write_str("broker connection failed"),
            CycleFailure::TransportPublish => f.write_str("publish failed"),
        }
    }
}

/// Per-cycle status flags.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CycleState {
    failed: bool,
    diagnostics_active: bool,
    failure: Option<CycleFailure>,
}

impl CycleState {
    /// Fresh state for a new wake cycle.
    pub const fn new() -> Self {
        Self {
            failed: false,
            diagnostics_active: false,
            failure: None,
        }
    }

    /// Returns `true` once any step has failed this cycle.
    pub const fn failed(&self) -> bool {
        self.failed
    }

    pub const fn diagnostics_active(&self) -> bool {
        self.diagnostics_active
    }

    /// First failure recorded this cycle.
    pub const fn failure(&self) -> Option<CycleFailure> {
        self.failure
    }

    /// Marks the cycle failed. The first recorded failure is kept.
    pub fn latch(&mut self, failure: CycleFailure) {
        self.failed = true;
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }

    /// `Err` with the recorded failure once the cycle has latched.
    pub fn check(&self) -> Result<(), CycleFailure> {
        match self.failure {
            Some(failure) if self.failed => Err(failure),
            _ => Ok(()),
        }
    }

    /// Sets the diagnostics flag. Returns `true` only on the call that flipped
    /// it, which is when the sink must be activated.
    pub fn activate_diagnostics(&mut self) -> bool {
        let first = !self.diagnostics_active;
        self.diagnostics_active = true;
        first
    }
}

/// Collaborators handed to the controller for one wake cycle.
pub struct NodeServices<S, N, T, P, D, C> {
    pub sensor: S,
    pub network: N,
    pub transport: T,
    pub power: P,
    pub diagnostics: D,
    pub clock: C,
}

/// What a finished cycle looked like, available when deep sleep returns.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CycleReport {
    /// Published reading, or the first failure.
    pub outcome: Result<SensorReading, CycleFailure>,
    pub state: CycleState,
    pub power: PowerState,
}

impl CycleReport {
    pub const fn published(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Drives one wake cycle over the supplied services.
pub struct CycleController<'cfg, S, N, T, P, D, C>
where
    P: PowerControl,
{
    config: &'cfg NodeConfig<'cfg>,
    sensor: S,
    network: N,
    transport: T,
    power: PowerStateManager<P>,
    diagnostics: D,
    clock: C,
    state: CycleState,
}

impl<'cfg, S, N, T, P, D, C> CycleController<'cfg, S, N, T, P, D, C>
where
    S: SensorService,
    N: NetworkJoin,
    T: TelemetryTransport,
    P: PowerControl,
    D: DiagnosticSink,
    C: Monotonic,
{
    pub fn new(config: &'cfg NodeConfig<'cfg>, services: NodeServices<S, N, T, P, D, C>) -> Self {
        Self {
            config,
            sensor: services.sensor,
            network: services.network,
            transport: services.transport,
            power: PowerStateManager::new(services.power),
            diagnostics: services.diagnostics,
            clock: services.clock,
            state: CycleState::new(),
        }
    }

    /// Runs the full cycle, ending with the deep-sleep request.
    ///
    /// On hardware the sleep request does not return. When it does (host
    /// builds), the report describes what the cycle did.
    pub fn run(&mut self) -> CycleReport {
        self.state = CycleState::new();
        self.power.begin_cycle();

        let outcome = self.execute_steps();

        self.power.power_down(
            &mut self.network,
            &mut self.transport,
            self.config.timing.sleep_duration,
        );

        CycleReport {
            outcome,
            state: self.state,
            power: self.power.state(),
        }
    }

    /// Releases the services, e.g. to inspect test doubles.
    pub fn into_services(self) -> NodeServices<S, N, T, P, D, C> {
        NodeServices {
            sensor: self.sensor,
            network: self.network,
            transport: self.transport,
            power: self.power.into_control(),
            diagnostics: self.diagnostics,
            clock: self.clock,
        }
    }

    fn execute_steps(&mut self) -> Result<SensorReading, CycleFailure> {
        self.init_sensor()?;
        self.join_network()?;
        self.connect_transport()?;
        let reading = self.read_sensor();
        self.publish(&reading)?;
        Ok(reading)
    }

    fn init_sensor(&mut self) -> Result<(), CycleFailure> {
        let address = self.config.sensor_address;
        self.sensor.init(address).map_err(|err| {
            self.fail(
                CycleFailure::PeripheralInit,
                format_args!("no sensor at {address:#04x} ({err:?})"),
            )
        })
    }

    fn join_network(&mut self) -> Result<(), CycleFailure> {
        let config = self.config;
        let rejected = CycleFailure::NetworkJoin(JoinFailure::Rejected);

        let powered = self
            .power
            .enable_radio(&self.state)
            .map_err(|err| self.fail(rejected, format_args!("{err}")))?;
        if !powered {
            return self.state.check();
        }

        let timing = config.timing;
        match wait_for_join(
            &mut self.network,
            &self.clock,
            &config.wifi,
            timing.join_timeout,
            timing.join_poll_interval,
        ) {
            Ok(()) => {}
            Err(JoinError::Service(err)) => {
                return Err(self.fail(rejected, format_args!("join request failed ({err:?})")));
            }
            Err(JoinError::LinkFailed) => {
                return Err(self.fail(
                    CycleFailure::NetworkJoin(JoinFailure::LinkFailed),
                    format_args!("association with {:?} refused", config.wifi.ssid),
                ));
            }
            Err(JoinError::TimedOut) => {
                return Err(self.fail(
                    CycleFailure::NetworkJoin(JoinFailure::TimedOut),
                    format_args!("no link after {} ms", timing.join_timeout.as_millis()),
                ));
            }
        }

        self.power
            .mark_joined()
            .map_err(|err| self.fail(rejected, format_args!("{err}")))
    }

    fn connect_transport(&mut self) -> Result<(), CycleFailure> {
        let config = self.config;
        let broker = &config.broker;
        match self.transport.connect(broker) {
            Ok(()) => {
                self.power.mark_transport_open();
                Ok(())
            }
            Err(err) => Err(self.fail(
                CycleFailure::TransportConnect,
                format_args!("{}:{} unreachable ({err:?})", broker.host, broker.port),
            )),
        }
    }

    fn read_sensor(&mut self) -> SensorReading {
        let sample = self.sensor.read();
        let reading = SensorReading::from_sample(sample, self.config.sea_level_hpa);
        if !reading.is_valid() {
            self.report(
                CycleStep::SensorRead,
                format_args!("non-finite measurement, publishing nulls"),
            );
        }
        reading
    }

    /// Publishing is the last step, so a rejection is reported and returned
    /// as the outcome without latching the cycle state.
    fn publish(&mut self, reading: &SensorReading) -> Result<(), CycleFailure> {
        let topic = self.config.broker.topic;
        let payload = match reading.to_payload() {
            Ok(payload) => payload,
            Err(err) => {
                self.report(CycleStep::Publish, format_args!("{err}"));
                return Err(CycleFailure::TransportPublish);
            }
        };

        if let Err(err) = self.transport.publish(topic, payload.as_bytes()) {
            self.report(
                CycleStep::Publish,
                format_args!("{topic} not accepted ({err:?})"),
            );
            return Err(CycleFailure::TransportPublish);
        }
        Ok(())
    }

    fn fail(&mut self, failure: CycleFailure, detail: fmt::Arguments<'_>) -> CycleFailure {
        self.state.latch(failure);
        self.report(failure.step(), detail);
        failure
    }

    fn report(&mut self, step: CycleStep, detail: fmt::Arguments<'_>) {
        if self.state.activate_diagnostics() {
            self.diagnostics.activate();
        }
        let line = compose(step, detail);
        self.diagnostics.emit(&line);
    }
}
