//! Process-wide configuration read once before the wake cycle begins.
//!
//! Credentials and broker details are borrowed for the lifetime of the cycle;
//! the firmware hands in `'static` strings baked in at build time while tests
//! and the emulator build them on the stack.

use core::time::Duration;

/// How long the node may spend associating with the access point.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(20);

/// Interval between link-status polls while joining.
pub const DEFAULT_JOIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Deep-sleep duration between wake cycles.
pub const DEFAULT_SLEEP_DURATION: Duration = Duration::from_secs(10 * 60);

/// Default I2C address of the environmental sensor (SDO tied low).
pub const DEFAULT_SENSOR_ADDRESS: u8 = 0x76;

/// Sea-level reference pressure used to derive altitude, in hPa.
pub const SEA_LEVEL_PRESSURE_HPA: f32 = 1013.25;

/// Default MQTT broker port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Wireless network credentials.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WifiCredentials<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

impl<'a> WifiCredentials<'a> {
    pub const fn new(ssid: &'a str, password: &'a str) -> Self {
        Self { ssid, password }
    }
}

/// Broker connection details and the topic readings are published to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BrokerConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub topic: &'a str,
}

impl<'a> BrokerConfig<'a> {
    /// Creates a broker configuration on the default port with no credentials.
    pub const fn new(host: &'a str, client_id: &'a str, topic: &'a str) -> Self {
        Self {
            host,
            port: DEFAULT_BROKER_PORT,
            client_id,
            username: "",
            password: "",
            topic,
        }
    }

    /// Overrides the broker port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the broker login.
    #[must_use]
    pub const fn with_login(mut self, username: &'a str, password: &'a str) -> Self {
        self.username = username;
        self.password = password;
        self
    }
}

/// Fixed timing constants for one wake cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleTiming {
    pub join_timeout: Duration,
    pub join_poll_interval: Duration,
    pub sleep_duration: Duration,
}

impl CycleTiming {
    pub const fn new(
        join_timeout: Duration,
        join_poll_interval: Duration,
        sleep_duration: Duration,
    ) -> Self {
        Self {
            join_timeout,
            join_poll_interval,
            sleep_duration,
        }
    }
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self::new(
            DEFAULT_JOIN_TIMEOUT,
            DEFAULT_JOIN_POLL_INTERVAL,
            DEFAULT_SLEEP_DURATION,
        )
    }
}

/// Everything the cycle controller reads from configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NodeConfig<'a> {
    pub wifi: WifiCredentials<'a>,
    pub broker: BrokerConfig<'a>,
    pub timing: CycleTiming,
    pub sensor_address: u8,
    pub sea_level_hpa: f32,
}

impl<'a> NodeConfig<'a> {
    /// Builds a configuration using the default timing, sensor address, and
    /// sea-level reference.
    pub const fn new(wifi: WifiCredentials<'a>, broker: BrokerConfig<'a>) -> Self {
        Self {
            wifi,
            broker,
            timing: CycleTiming::new(
                DEFAULT_JOIN_TIMEOUT,
                DEFAULT_JOIN_POLL_INTERVAL,
                DEFAULT_SLEEP_DURATION,
            ),
            sensor_address: DEFAULT_SENSOR_ADDRESS,
            sea_level_hpa: SEA_LEVEL_PRESSURE_HPA,
        }
    }

    /// Replaces the cycle timing.
    #[must_use]
    pub const fn with_timing(mut self, timing: CycleTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Replaces the sensor bus address.
    #[must_use]
    pub const fn with_sensor_address(mut self, address: u8) -> Self {
        self.sensor_address = address;
        self
    }
}
