use std::cell::{Cell, RefCell};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use node_core::clock::Monotonic;
use node_core::config::{BrokerConfig, NodeConfig, WifiCredentials};
use node_core::cycle::{
    CycleController, CycleReport, LinkStatus, NetworkJoin, NodeServices, SensorService,
    TelemetryTransport,
};
use node_core::diagnostics::DiagnosticSink;
use node_core::power::PowerControl;
use node_core::sensor::SensorSample;

/// Polls after which the emulated access point accepts the association.
const JOIN_POLLS: u32 = 3;

/// Time the emulated sensor takes for one forced measurement.
const MEASUREMENT_TIME: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scenario {
    Nominal,
    SensorAbsent,
    JoinTimeout,
    BrokerDown,
    PublishFailure,
    InvalidReading,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Nominal,
        Scenario::SensorAbsent,
        Scenario::JoinTimeout,
        Scenario::BrokerDown,
        Scenario::PublishFailure,
        Scenario::InvalidReading,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Scenario::Nominal => "nominal",
            Scenario::SensorAbsent => "sensor-absent",
            Scenario::JoinTimeout => "join-timeout",
            Scenario::BrokerDown => "broker-down",
            Scenario::PublishFailure => "publish-failure",
            Scenario::InvalidReading => "invalid-reading",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            Scenario::Nominal => "all services healthy",
            Scenario::SensorAbsent => "no device on the sensor bus",
            Scenario::JoinTimeout => "access point never answers",
            Scenario::BrokerDown => "broker refuses connections",
            Scenario::PublishFailure => "broker drops the publish",
            Scenario::InvalidReading => "sensor returns non-finite values",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| format!("Unknown scenario `{tag}`"))
    }

    fn sample(self, cycle: u32) -> SensorSample {
        if self == Scenario::InvalidReading {
            return SensorSample::invalid();
        }
        // Small drift per cycle so consecutive payloads differ.
        let drift = f32::from(u16::try_from(cycle % 8).unwrap_or(0)) * 0.25;
        SensorSample::new(21.0 + drift, 100_900.0 - drift * 40.0, 48.0 + drift)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptRole {
    Cycle,
    Service,
    Diagnostic,
    Failure,
}

impl TranscriptRole {
    pub fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Cycle => "EMU <",
            TranscriptRole::Service => "NODE>",
            TranscriptRole::Diagnostic => "DIAG!",
            TranscriptRole::Failure => "FAIL!",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TranscriptLine {
    pub at: Duration,
    pub role: TranscriptRole,
    pub text: String,
}

impl TranscriptLine {
    pub fn render(&self) -> String {
        format!(
            "[+{:>9} ms] {} {}",
            self.at.as_millis(),
            self.role.prefix(),
            self.text
        )
    }
}

pub struct Session {
    scenario: Scenario,
    config: NodeConfig<'static>,
    clock: VirtualClock,
    recorder: Recorder,
    transcript: Option<BufWriter<File>>,
}

impl Session {
    pub fn new(scenario: Scenario, log_path: Option<&Path>) -> io::Result<Self> {
        let transcript = log_path
            .map(|path| open_transcript(path, scenario))
            .transpose()?;
        let clock = VirtualClock::default();

        Ok(Self {
            scenario,
            config: NodeConfig::new(
                WifiCredentials::new("emulated-ap", "emulated-passphrase"),
                BrokerConfig::new("broker.emulated", "node-emulator", "sensors/node-emulator"),
            ),
            recorder: Recorder::new(clock.clone()),
            clock,
            transcript,
        })
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.clock.millis())
    }

    /// Runs one wake cycle with a freshly built controller and returns its
    /// transcript.
    pub fn run_cycle(&mut self, cycle: u32) -> io::Result<Vec<TranscriptLine>> {
        self.recorder.record(
            TranscriptRole::Cycle,
            format!("wake cycle {cycle} ({})", self.scenario.tag()),
        );

        let services = NodeServices {
            sensor: EmulatedSensor {
                recorder: self.recorder.clone(),
                clock: self.clock.clone(),
                present: self.scenario != Scenario::SensorAbsent,
                sample: self.scenario.sample(cycle),
            },
            network: EmulatedAccessPoint {
                recorder: self.recorder.clone(),
                answers: self.scenario != Scenario::JoinTimeout,
                polls: 0,
                last: None,
            },
            transport: EmulatedBroker {
                recorder: self.recorder.clone(),
                accepts_connections: self.scenario != Scenario::BrokerDown,
                acknowledges: self.scenario != Scenario::PublishFailure,
            },
            power: EmulatedBoard {
                recorder: self.recorder.clone(),
                clock: self.clock.clone(),
            },
            diagnostics: ConsoleSink {
                recorder: self.recorder.clone(),
            },
            clock: self.clock.clone(),
        };

        let report = CycleController::new(&self.config, services).run();
        self.record_report(&report);

        let lines = self.recorder.drain();
        if let Some(transcript) = self.transcript.as_mut() {
            for line in &lines {
                writeln!(transcript, "{}", line.render())?;
            }
            transcript.flush()?;
        }
        Ok(lines)
    }

    fn record_report(&self, report: &CycleReport) {
        match report.outcome {
            Ok(reading) => self.recorder.record(
                TranscriptRole::Cycle,
                format!(
                    "published temperature={} pressure={} altitude={} humidity={}",
                    reading.temperature, reading.pressure, reading.altitude, reading.humidity
                ),
            ),
            Err(failure) => self.recorder.record(
                TranscriptRole::Failure,
                format!("cycle failed at {}: {failure}", failure.step()),
            ),
        }
        self.recorder.record(
            TranscriptRole::Cycle,
            format!(
                "state failed={} diagnostics={} power={}",
                report.state.failed(),
                report.state.diagnostics_active(),
                report.power
            ),
        );
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualInstant(u64);

impl Add<Duration> for VirtualInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(
            self.0
                .saturating_add(u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX)),
        )
    }
}

/// Millisecond clock that only advances when the node waits or sleeps.
#[derive(Clone, Default)]
pub struct VirtualClock(Rc<Cell<u64>>);

impl VirtualClock {
    pub fn millis(&self) -> u64 {
        self.0.get()
    }

    fn advance(&self, duration: Duration) {
        let step = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.0.set(self.0.get().saturating_add(step));
    }
}

impl Monotonic for VirtualClock {
    type Instant = VirtualInstant;

    fn now(&self) -> Self::Instant {
        VirtualInstant(self.0.get())
    }

    fn delay(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Clone)]
struct Recorder {
    clock: VirtualClock,
    lines: Rc<RefCell<Vec<TranscriptLine>>>,
}

impl Recorder {
    fn new(clock: VirtualClock) -> Self {
        Self {
            clock,
            lines: Rc::default(),
        }
    }

    fn record(&self, role: TranscriptRole, text: impl Into<String>) {
        self.lines.borrow_mut().push(TranscriptLine {
            at: Duration::from_millis(self.clock.millis()),
            role,
            text: text.into(),
        });
    }

    fn drain(&self) -> Vec<TranscriptLine> {
        self.lines.borrow_mut().drain(..).collect()
    }
}

struct EmulatedSensor {
    recorder: Recorder,
    clock: VirtualClock,
    present: bool,
    sample: SensorSample,
}

impl SensorService for EmulatedSensor {
    type Error = &'static str;

    fn init(&mut self, address: u8) -> Result<(), Self::Error> {
        self.recorder.record(
            TranscriptRole::Service,
            format!("sensor init address={address:#04x}"),
        );
        if self.present {
            Ok(())
        } else {
            Err("no device acknowledged")
        }
    }

    fn read(&mut self) -> SensorSample {
        self.clock.advance(MEASUREMENT_TIME);
        self.recorder.record(
            TranscriptRole::Service,
            format!(
                "sensor read {} C, {} Pa, {} %",
                self.sample.temperature_c, self.sample.pressure_pa, self.sample.humidity_pct
            ),
        );
        self.sample
    }
}

struct EmulatedAccessPoint {
    recorder: Recorder,
    answers: bool,
    polls: u32,
    last: Option<LinkStatus>,
}

impl NetworkJoin for EmulatedAccessPoint {
    type Error = &'static str;

    fn begin_join(&mut self, credentials: &WifiCredentials<'_>) -> Result<(), Self::Error> {
        self.recorder.record(
            TranscriptRole::Service,
            format!("join ssid={:?}", credentials.ssid),
        );
        self.polls = 0;
        self.last = None;
        Ok(())
    }

    fn link_status(&mut self) -> Result<LinkStatus, Self::Error> {
        self.polls += 1;
        let status = if self.answers && self.polls >= JOIN_POLLS {
            LinkStatus::Connected
        } else {
            LinkStatus::Joining
        };
        // Only transitions are worth a transcript line.
        if self.last != Some(status) {
            self.recorder.record(
                TranscriptRole::Service,
                format!("link {status:?} after {} poll(s)", self.polls),
            );
            self.last = Some(status);
        }
        Ok(status)
    }

    fn leave(&mut self) {
        self.recorder.record(
            TranscriptRole::Service,
            format!("leave network after {} poll(s)", self.polls),
        );
    }
}

struct EmulatedBroker {
    recorder: Recorder,
    accepts_connections: bool,
    acknowledges: bool,
}

impl TelemetryTransport for EmulatedBroker {
    type Error = &'static str;

    fn connect(&mut self, broker: &BrokerConfig<'_>) -> Result<(), Self::Error> {
        self.recorder.record(
            TranscriptRole::Service,
            format!(
                "connect {}:{} client={}",
                broker.host, broker.port, broker.client_id
            ),
        );
        if self.accepts_connections {
            Ok(())
        } else {
            Err("connection refused")
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error> {
        self.recorder.record(
            TranscriptRole::Service,
            format!("publish {topic} {}", String::from_utf8_lossy(payload)),
        );
        if self.acknowledges {
            Ok(())
        } else {
            Err("no acknowledgement")
        }
    }

    fn disconnect(&mut self) {
        self.recorder
            .record(TranscriptRole::Service, "disconnect from broker");
    }
}

struct EmulatedBoard {
    recorder: Recorder,
    clock: VirtualClock,
}

impl PowerControl for EmulatedBoard {
    fn radio_off(&mut self) {
        self.recorder.record(TranscriptRole::Service, "radio off");
    }

    fn radio_on(&mut self) {
        self.recorder.record(TranscriptRole::Service, "radio on");
    }

    fn deep_sleep(&mut self, wake_after: Duration) {
        self.recorder.record(
            TranscriptRole::Service,
            format!("deep sleep for {} s", wake_after.as_secs()),
        );
        self.clock.advance(wake_after);
    }
}

struct ConsoleSink {
    recorder: Recorder,
}

impl DiagnosticSink for ConsoleSink {
    fn activate(&mut self) {
        self.recorder
            .record(TranscriptRole::Diagnostic, "diagnostic console up");
    }

    fn emit(&mut self, line: &str) {
        self.recorder.record(TranscriptRole::Diagnostic, line);
    }
}

/// Creates the transcript file and writes its header.
fn open_transcript(path: &Path, scenario: Scenario) -> io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(
        writer,
        "# {} wake cycles: {}",
        scenario.tag(),
        scenario.header()
    )?;
    writeln!(writer, "# virtual ms since first wake")?;
    writer.flush()?;
    Ok(writer)
}
