use core::cell::Cell;
use core::convert::Infallible;
use core::ops::Add;
use core::time::Duration;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_io::{ErrorType, Read, ReadReady, Write};
use node_core::clock::Monotonic;
use node_core::config::{BrokerConfig, WifiCredentials};
use node_core::cycle::{LinkStatus, NetworkJoin, TelemetryTransport};
use node_core::modem::{
    BOOT_TIMEOUT, COMMAND_TIMEOUT, CONNECT_TIMEOUT, EspAt, ModemError, PUBLISH_TIMEOUT,
};

const CREDENTIALS: WifiCredentials<'static> = WifiCredentials::new("field,net", "p\"w");

#[test]
fn join_sends_setup_then_association_request() {
    let uart = ScriptedUart::new()
        .reply(Match::Exact("AT"), "\r\nOK\r\n")
        .reply(Match::Exact("ATE0"), "ATE0\r\n\r\nOK\r\n")
        .reply(Match::Exact("AT+CWMODE=1"), "\r\nOK\r\n")
        .reply(
            Match::Prefix("AT+CWJAP="),
            "WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n",
        );
    let mut modem = EspAt::new(uart, TestClock::default());

    modem.begin_join(&CREDENTIALS).expect("join request should be accepted");
    let status = modem.link_status().expect("status poll");

    assert_eq!(status, LinkStatus::Connected);
    let (uart, _) = modem.release();
    assert_eq!(
        uart.sent,
        vec![
            "AT",
            "ATE0",
            "AT+CWMODE=1",
            r#"AT+CWJAP="field\,net","p\"w""#,
        ]
    );
}

#[test]
fn link_reports_joining_until_the_modem_answers() {
    let uart = ScriptedUart::ready();
    let mut modem = EspAt::new(uart, TestClock::default());

    modem.begin_join(&CREDENTIALS).expect("join request");
    assert_eq!(modem.link_status(), Ok(LinkStatus::Joining));

    let (mut uart, clock) = modem.release();
    uart.push_rx("WIFI CONNECTED\r\nWIFI GOT IP\r\n");
    let mut modem = EspAt::new(uart, clock);
    // A fresh client does not know a join is pending, but GOT IP is enough.
    assert_eq!(modem.link_status(), Ok(LinkStatus::Connected));
}

#[test]
fn refused_association_reports_failed_link() {
    let uart = ScriptedUart::ready().reply(Match::Prefix("AT+CWJAP="), "+CWJAP:2\r\n\r\nFAIL\r\n");
    let mut modem = EspAt::new(uart, TestClock::default());

    modem.begin_join(&CREDENTIALS).expect("join request");

    assert_eq!(modem.link_status(), Ok(LinkStatus::Failed));
}

#[test]
fn silent_modem_times_out_during_boot_probe() {
    let clock = TestClock::default();
    let mut modem = EspAt::new(ScriptedUart::new(), clock.clone());

    let result = modem.begin_join(&CREDENTIALS);

    assert_eq!(result, Err(ModemError::Timeout));
    let elapsed = Duration::from_millis(clock.millis());
    assert!(
        elapsed >= BOOT_TIMEOUT && elapsed < BOOT_TIMEOUT + Duration::from_millis(300),
        "boot probe should give up shortly after {BOOT_TIMEOUT:?}, took {elapsed:?}"
    );

    let (uart, _) = modem.release();
    assert!(uart.sent.iter().all(|command| command == "AT"));
    assert!(uart.sent.len() > 1, "modem should be probed repeatedly");
}

#[test]
fn connect_configures_user_then_opens_session() {
    let uart = ScriptedUart::new()
        .reply(Match::Prefix("AT+MQTTUSERCFG="), "\r\nOK\r\n")
        .reply(
            Match::Prefix("AT+MQTTCONN="),
            "+MQTTCONNECTED:0,1,\"broker.local\",\"1883\",\"\",0\r\n\r\nOK\r\n",
        );
    let mut modem = EspAt::new(uart, TestClock::default());
    let broker = BrokerConfig::new("broker.local", "node-7", "sensors/node-7")
        .with_login("telemetry", "s3cret");

    modem.connect(&broker).expect("broker session");

    let (uart, _) = modem.release();
    assert_eq!(
        uart.sent,
        vec![
            r#"AT+MQTTUSERCFG=0,1,"node-7","telemetry","s3cret",0,0,"""#,
            r#"AT+MQTTCONN=0,"broker.local",1883,0"#,
        ]
    );
}

#[test]
fn unreachable_broker_times_out() {
    let clock = TestClock::default();
    let uart = ScriptedUart::new().reply(Match::Prefix("AT+MQTTUSERCFG="), "\r\nOK\r\n");
    let mut modem = EspAt::new(uart, clock.clone());

    let result = modem.connect(&BrokerConfig::new("10.0.0.9", "node-7", "t"));

    assert_eq!(result, Err(ModemError::Timeout));
    assert!(Duration::from_millis(clock.millis()) >= CONNECT_TIMEOUT);
}

#[test]
fn connect_error_is_rejected() {
    let uart = ScriptedUart::new()
        .reply(Match::Prefix("AT+MQTTUSERCFG="), "\r\nOK\r\n")
        .reply(Match::Prefix("AT+MQTTCONN="), "\r\nERROR\r\n");
    let mut modem = EspAt::new(uart, TestClock::default());

    let result = modem.connect(&BrokerConfig::new("broker.local", "node-7", "t"));

    assert_eq!(result, Err(ModemError::Rejected));
}

#[test]
fn publish_writes_payload_after_prompt() {
    let payload = br#"{"temperature":21.5,"pressure":1013.25,"altitude":0,"humidity":40}"#;
    let uart = ScriptedUart::new()
        .reply(Match::Prefix("AT+MQTTPUBRAW="), "\r\nOK\r\n\r\n>")
        .reply(Match::Prefix("{"), "\r\n+MQTTPUB:OK\r\n");
    let mut modem = EspAt::new(uart, TestClock::default());

    modem
        .publish("sensors/node-7", payload)
        .expect("publish should be acknowledged");

    let (uart, _) = modem.release();
    assert_eq!(uart.sent.len(), 2);
    assert_eq!(
        uart.sent[0],
        format!("AT+MQTTPUBRAW=0,\"sensors/node-7\",{},0,0", payload.len())
    );
    assert_eq!(uart.sent[1].as_bytes(), payload);
}

#[test]
fn refused_publish_is_rejected() {
    let uart = ScriptedUart::new()
        .reply(Match::Prefix("AT+MQTTPUBRAW="), "\r\nOK\r\n\r\n>")
        .reply(Match::Prefix("{"), "\r\n+MQTTPUB:FAIL\r\n");
    let mut modem = EspAt::new(uart, TestClock::default());

    assert_eq!(modem.publish("t", b"{}"), Err(ModemError::Rejected));
}

#[test]
fn unacknowledged_publish_times_out() {
    let clock = TestClock::default();
    let uart = ScriptedUart::new().reply(Match::Prefix("AT+MQTTPUBRAW="), "\r\n>");
    let mut modem = EspAt::new(uart, clock.clone());

    assert_eq!(modem.publish("t", b"{}"), Err(ModemError::Timeout));
    assert!(Duration::from_millis(clock.millis()) >= PUBLISH_TIMEOUT);
}

#[test]
fn teardown_commands_ignore_failures() {
    let uart = ScriptedUart::new()
        .reply(Match::Exact("AT+MQTTCLEAN=0"), "\r\nERROR\r\n")
        .reply(Match::Exact("AT+CWQAP"), "\r\nOK\r\n");
    let mut modem = EspAt::new(uart, TestClock::default());

    modem.disconnect();
    modem.leave();

    assert_eq!(modem.link_status(), Ok(LinkStatus::Idle));
    let (uart, _) = modem.release();
    assert_eq!(uart.sent, vec!["AT+MQTTCLEAN=0", "AT+CWQAP"]);
}

#[test]
fn overlong_lines_are_ignored() {
    let noise = "x".repeat(300);
    let uart = ScriptedUart::ready().reply(
        Match::Prefix("AT+CWJAP="),
        Box::leak(format!("{noise}\r\nWIFI GOT IP\r\n").into_boxed_str()),
    );
    let mut modem = EspAt::new(uart, TestClock::default());

    modem.begin_join(&CREDENTIALS).expect("join request");

    assert_eq!(modem.link_status(), Ok(LinkStatus::Connected));
}

#[test]
fn busy_modem_cannot_hold_a_command_past_its_deadline() {
    let clock = TestClock::default();
    let uart = ChattyUart::new(b"busy p...\r\n", Some(clock.clone()));
    let mut modem = EspAt::new(uart, clock.clone());

    let result = modem.connect(&BrokerConfig::new("broker.local", "node-7", "t"));

    assert_eq!(result, Err(ModemError::Timeout));
    let elapsed = Duration::from_millis(clock.millis());
    assert!(
        elapsed >= COMMAND_TIMEOUT && elapsed <= COMMAND_TIMEOUT + Duration::from_millis(2),
        "command should give up at {COMMAND_TIMEOUT:?}, took {elapsed:?}"
    );
}

#[test]
fn unterminated_noise_still_times_out() {
    let clock = TestClock::default();
    let uart = ChattyUart::new(b"\xff\x00garbage", None);
    let mut modem = EspAt::new(uart, clock.clone());

    let result = modem.connect(&BrokerConfig::new("broker.local", "node-7", "t"));

    assert_eq!(result, Err(ModemError::Timeout));
    assert!(Duration::from_millis(clock.millis()) >= COMMAND_TIMEOUT);
}

#[test]
fn link_status_returns_while_the_modem_keeps_talking() {
    let uart = ChattyUart::new(b"busy p...\r\n", None);
    let mut modem = EspAt::new(uart, TestClock::default());

    assert_eq!(modem.link_status(), Ok(LinkStatus::Idle));
}

#[test]
fn angle_bracket_outside_publish_is_line_text() {
    let uart = ScriptedUart::ready().reply(Match::Prefix("AT+CWJAP="), ">FAIL\r\n");
    let mut modem = EspAt::new(uart, TestClock::default());

    modem.begin_join(&CREDENTIALS).expect("join request");

    assert_eq!(modem.link_status(), Ok(LinkStatus::Joining));
}

#[derive(Copy, Clone, Debug)]
enum Match {
    Exact(&'static str),
    Prefix(&'static str),
}

impl Match {
    fn matches(self, frame: &str) -> bool {
        match self {
            Match::Exact(expected) => frame == expected,
            Match::Prefix(prefix) => frame.starts_with(prefix),
        }
    }
}

/// UART double that answers each flushed frame from a reply table.
struct ScriptedUart {
    rx: VecDeque<u8>,
    pending: Vec<u8>,
    sent: Vec<String>,
    replies: Vec<(Match, &'static str)>,
}

impl ScriptedUart {
    fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            pending: Vec::new(),
            sent: Vec::new(),
            replies: Vec::new(),
        }
    }

    /// Modem that boots and accepts the join setup commands.
    fn ready() -> Self {
        Self::new()
            .reply(Match::Exact("AT"), "\r\nOK\r\n")
            .reply(Match::Exact("ATE0"), "\r\nOK\r\n")
            .reply(Match::Exact("AT+CWMODE=1"), "\r\nOK\r\n")
    }

    fn reply(mut self, pattern: Match, response: &'static str) -> Self {
        self.replies.push((pattern, response));
        self
    }

    fn push_rx(&mut self, bytes: &str) {
        self.rx.extend(bytes.bytes());
    }
}

impl ErrorType for ScriptedUart {
    type Error = Infallible;
}

impl Read for ScriptedUart {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => {
                    buf[filled] = byte;
                    filled += 1;
                }
                None => break,
            }
        }
        Ok(filled)
    }
}

impl ReadReady for ScriptedUart {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl Write for ScriptedUart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        let frame = String::from_utf8(core::mem::take(&mut self.pending)).expect("ascii frame");
        let frame = frame.trim_end_matches("\r\n").to_owned();
        if let Some((_, response)) = self.replies.iter().find(|(pattern, _)| pattern.matches(&frame)) {
            let response = *response;
            self.push_rx(response);
        }
        self.sent.push(frame);
        Ok(())
    }
}

/// UART double that is always readable and repeats `pattern` forever.
///
/// With a clock attached, every newline costs one millisecond.
struct ChattyUart {
    pattern: &'static [u8],
    cursor: usize,
    clock: Option<TestClock>,
}

impl ChattyUart {
    fn new(pattern: &'static [u8], clock: Option<TestClock>) -> Self {
        Self {
            pattern,
            cursor: 0,
            clock,
        }
    }
}

impl ErrorType for ChattyUart {
    type Error = Infallible;
}

impl Read for ChattyUart {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        for slot in buf.iter_mut() {
            let byte = self.pattern[self.cursor];
            self.cursor = (self.cursor + 1) % self.pattern.len();
            if byte == b'\n' {
                if let Some(clock) = &self.clock {
                    clock.delay(Duration::from_millis(1));
                }
            }
            *slot = byte;
        }
        Ok(buf.len())
    }
}

impl ReadReady for ChattyUart {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

impl Write for ChattyUart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct MockInstant(u64);

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + u64::try_from(rhs.as_millis()).expect("duration fits in u64"))
    }
}

#[derive(Clone, Default)]
struct TestClock(Rc<Cell<u64>>);

impl TestClock {
    fn millis(&self) -> u64 {
        self.0.get()
    }
}

impl Monotonic for TestClock {
    type Instant = MockInstant;

    fn now(&self) -> Self::Instant {
        MockInstant(self.0.get())
    }

    fn delay(&self, duration: Duration) {
        let step = u64::try_from(duration.as_millis()).expect("duration fits in u64");
        self.0.set(self.0.get() + step);
    }
}
