//! ESP-AT Wi-Fi coprocessor client.
//!
//! Speaks Espressif's AT command set over any UART that implements the
//! blocking `embedded-io` traits. The client fills both the network-join and
//! the publish/subscribe transport roles: the coprocessor owns the Wi-Fi
//! association and the MQTT session, the host only issues commands and reads
//! the terminal response lines.
//!
//! Every command waits against a deadline taken from the monotonic clock, so
//! nothing here can block longer than the longest per-command timeout.

use core::fmt::{self, Write as _};
use core::time::Duration;

use embedded_io::{Read, ReadReady, Write};
use heapless::String;

use crate::clock::Monotonic;
use crate::config::{BrokerConfig, WifiCredentials};
use crate::cycle::{LinkStatus, NetworkJoin, TelemetryTransport};

/// How long the coprocessor may take to answer `AT` after power-up.
pub const BOOT_TIMEOUT: Duration = Duration::from_secs(3);

/// Gap between `AT` probes while the coprocessor boots.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Timeout for plain configuration commands.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout for `AT+MQTTCONN`.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the raw-data prompt after `AT+MQTTPUBRAW`.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout for the broker acknowledgement of a publish.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between polls of an idle UART.
pub const IDLE_POLL: Duration = Duration::from_millis(1);

const LINE_CAPACITY: usize = 128;
const COMMAND_CAPACITY: usize = 256;

/// Bytes consumed per poll before control returns to the deadline check.
const POLL_BUDGET: usize = LINE_CAPACITY + 2;

/// Polls spent draining input per `link_status` call.
const DRAIN_LIMIT: usize = 16;

/// MQTT link id used for every session command.
const LINK_ID: u8 = 0;

/// Errors produced by [`EspAt`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModemError<E> {
    /// The UART reported an error.
    Uart(E),
    /// No terminal response before the deadline.
    Timeout,
    /// The coprocessor answered `ERROR`/`FAIL` or refused a publish.
    Rejected,
    /// A command did not fit in the command buffer.
    CommandOverflow,
}

impl<E: fmt::Debug> fmt::Display for ModemError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModemError::Uart(err) => write!(f, "uart error {err:?}"),
            ModemError::Timeout => f.write_str("no response before deadline"),
            ModemError::Rejected => f.write_str("command rejected"),
            ModemError::CommandOverflow => {
                write!(f, "command exceeds {COMMAND_CAPACITY} bytes")
            }
        }
    }
}

/// Response line categories the client reacts to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Response {
    Ok,
    Error,
    Fail,
    /// Raw-data prompt (`>`).
    Prompt,
    GotIp,
    Disconnected,
    /// `+CWJAP:<code>` join failure report.
    JoinRefused,
    Published,
    PublishRefused,
    /// Anything else: echoes, URCs the client ignores, overlong lines.
    Other,
}

impl Response {
    /// Classifies one response line with the line terminator removed.
    pub fn classify(line: &str) -> Self {
        match line.trim_end() {
            "OK" => Response::Ok,
            "ERROR" => Response::Error,
            "FAIL" => Response::Fail,
            ">" => Response::Prompt,
            "WIFI GOT IP" => Response::GotIp,
            "WIFI DISCONNECT" => Response::Disconnected,
            "+MQTTPUB:OK" => Response::Published,
            "+MQTTPUB:FAIL" => Response::PublishRefused,
            other if other.starts_with("+CWJAP:") => Response::JoinRefused,
            _ => Response::Other,
        }
    }

    const fn is_failure(self) -> bool {
        matches!(
            self,
            Response::Error | Response::Fail | Response::PublishRefused
        )
    }
}

/// String parameter rendered with ESP-AT quoting.
///
/// The coprocessor splits parameters on commas, so `"`, `,`, and `\` inside a
/// value are escaped with a backslash.
pub struct Quoted<'a>(pub &'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('"')?;
        for ch in self.0.chars() {
            if matches!(ch, '"' | ',' | '\\') {
                f.write_char('\\')?;
            }
            f.write_char(ch)?;
        }
        f.write_char('"')
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum JoinProgress {
    Idle,
    Pending,
    Connected,
    Failed,
}

/// ESP-AT client over a blocking UART.
pub struct EspAt<U, C> {
    uart: U,
    clock: C,
    line: String<LINE_CAPACITY>,
    line_overflowed: bool,
    join: JoinProgress,
}

impl<U, C> EspAt<U, C>
where
    U: Read + ReadReady + Write,
    C: Monotonic,
{
    pub fn new(uart: U, clock: C) -> Self {
        Self {
            uart,
            clock,
            line: String::new(),
            line_overflowed: false,
            join: JoinProgress::Idle,
        }
    }

    /// Returns the UART and clock.
    pub fn release(self) -> (U, C) {
        (self.uart, self.clock)
    }

    /// Probes with `AT` until the coprocessor answers or [`BOOT_TIMEOUT`]
    /// passes.
    pub fn wait_ready(&mut self) -> Result<(), ModemError<U::Error>> {
        let boot_deadline = self.clock.deadline_after(BOOT_TIMEOUT);
        loop {
            self.send(format_args!("AT"))?;
            match self.wait_for(Response::Ok, PROBE_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(ModemError::Timeout | ModemError::Rejected) => {}
                Err(err) => return Err(err),
            }
            if self.clock.has_elapsed(boot_deadline) {
                return Err(ModemError::Timeout);
            }
        }
    }

    /// Sends a command and waits for `OK`.
    pub fn command(
        &mut self,
        args: fmt::Arguments<'_>,
        timeout: Duration,
    ) -> Result<(), ModemError<U::Error>> {
        self.send(args)?;
        self.wait_for(Response::Ok, timeout)
    }

    fn send(&mut self, args: fmt::Arguments<'_>) -> Result<(), ModemError<U::Error>> {
        let mut command: String<COMMAND_CAPACITY> = String::new();
        command
            .write_fmt(args)
            .and_then(|()| command.write_str("\r\n"))
            .map_err(|_| ModemError::CommandOverflow)?;
        self.write_raw(command.as_bytes())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ModemError<U::Error>> {
        self.uart.write_all(bytes).map_err(ModemError::Uart)?;
        self.uart.flush().map_err(ModemError::Uart)
    }

    /// Waits until `expected` arrives, a failure response arrives, or
    /// `timeout` passes.
    fn wait_for(
        &mut self,
        expected: Response,
        timeout: Duration,
    ) -> Result<(), ModemError<U::Error>> {
        let deadline = self.clock.deadline_after(timeout);
        let accept_prompt = expected == Response::Prompt;
        loop {
            match self.poll_response(accept_prompt)? {
                Some(response) if response == expected => return Ok(()),
                Some(response) if response.is_failure() => return Err(ModemError::Rejected),
                Some(_) => {}
                None => self.clock.delay(IDLE_POLL),
            }
            if self.clock.has_elapsed(deadline) {
                return Err(ModemError::Timeout);
            }
        }
    }

    /// Returns the next complete response, or `None` once the UART runs dry or
    /// [`POLL_BUDGET`] bytes have been consumed.
    ///
    /// A `>` at the start of a line is only the raw-data prompt while
    /// `accept_prompt` is set.
    fn poll_response(
        &mut self,
        accept_prompt: bool,
    ) -> Result<Option<Response>, ModemError<U::Error>> {
        for _ in 0..POLL_BUDGET {
            if !self.uart.read_ready().map_err(ModemError::Uart)? {
                break;
            }
            let mut byte = [0u8; 1];
            if self.uart.read(&mut byte).map_err(ModemError::Uart)? == 0 {
                break;
            }

            match byte[0] {
                b'\r' => {}
                b'\n' => {
                    if let Some(response) = self.finish_line() {
                        self.observe(response);
                        return Ok(Some(response));
                    }
                }
                b'>' if accept_prompt && self.line.is_empty() && !self.line_overflowed => {
                    return Ok(Some(Response::Prompt));
                }
                other => {
                    if self.line.push(char::from(other)).is_err() {
                        self.line_overflowed = true;
                    }
                }
            }
        }
        Ok(None)
    }

    fn finish_line(&mut self) -> Option<Response> {
        let response = if self.line_overflowed {
            Some(Response::Other)
        } else if self.line.is_empty() {
            None
        } else {
            Some(Response::classify(&self.line))
        };
        self.line.clear();
        self.line_overflowed = false;
        response
    }

    fn observe(&mut self, response: Response) {
        self.join = match (self.join, response) {
            (_, Response::GotIp) | (JoinProgress::Pending, Response::Ok) => JoinProgress::Connected,
            (
                JoinProgress::Pending,
                Response::JoinRefused | Response::Fail | Response::Error,
            ) => JoinProgress::Failed,
            (JoinProgress::Connected, Response::Disconnected) => JoinProgress::Idle,
            (state, _) => state,
        };
    }
}

impl<U, C> NetworkJoin for EspAt<U, C>
where
    U: Read + ReadReady + Write,
    C: Monotonic,
{
    type Error = ModemError<U::Error>;

    fn begin_join(&mut self, credentials: &WifiCredentials<'_>) -> Result<(), Self::Error> {
        self.join = JoinProgress::Idle;
        self.wait_ready()?;
        self.command(format_args!("ATE0"), COMMAND_TIMEOUT)?;
        self.command(format_args!("AT+CWMODE=1"), COMMAND_TIMEOUT)?;
        self.send(format_args!(
            "AT+CWJAP={},{}",
            Quoted(credentials.ssid),
            Quoted(credentials.password)
        ))?;
        self.join = JoinProgress::Pending;
        Ok(())
    }

    fn link_status(&mut self) -> Result<LinkStatus, Self::Error> {
        for _ in 0..DRAIN_LIMIT {
            self.poll_response(false)?;
            if !self.uart.read_ready().map_err(ModemError::Uart)? {
                break;
            }
        }
        Ok(match self.join {
            JoinProgress::Idle => LinkStatus::Idle,
            JoinProgress::Pending => LinkStatus::Joining,
            JoinProgress::Connected => LinkStatus::Connected,
            JoinProgress::Failed => LinkStatus::Failed,
        })
    }

    fn leave(&mut self) {
        let _ = self.command(format_args!("AT+CWQAP"), COMMAND_TIMEOUT);
        self.join = JoinProgress::Idle;
    }
}

impl<U, C> TelemetryTransport for EspAt<U, C>
where
    U: Read + ReadReady + Write,
    C: Monotonic,
{
    type Error = ModemError<U::Error>;

    fn connect(&mut self, broker: &BrokerConfig<'_>) -> Result<(), Self::Error> {
        self.command(
            format_args!(
                "AT+MQTTUSERCFG={LINK_ID},1,{},{},{},0,0,\"\"",
                Quoted(broker.client_id),
                Quoted(broker.username),
                Quoted(broker.password)
            ),
            COMMAND_TIMEOUT,
        )?;
        self.command(
            format_args!(
                "AT+MQTTCONN={LINK_ID},{},{},0",
                Quoted(broker.host),
                broker.port
            ),
            CONNECT_TIMEOUT,
        )
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error> {
        self.send(format_args!(
            "AT+MQTTPUBRAW={LINK_ID},{},{},0,0",
            Quoted(topic),
            payload.len()
        ))?;
        self.wait_for(Response::Prompt, PROMPT_TIMEOUT)?;
        self.write_raw(payload)?;
        self.wait_for(Response::Published, PUBLISH_TIMEOUT)
    }

    fn disconnect(&mut self) {
        let _ = self.command(format_args!("AT+MQTTCLEAN={LINK_ID}"), COMMAND_TIMEOUT);
    }
}
