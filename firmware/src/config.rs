//! Node configuration baked in at build time.
//!
//! `build.rs` forwards the `NODE_*` settings from the environment or a `.env`
//! file; an unparsable broker port fails the build.

use node_core::config::{BrokerConfig, NodeConfig, WifiCredentials};

const BROKER_PORT: u16 = match parse_port(env!("NODE_BROKER_PORT")) {
    Some(port) => port,
    None => panic!("NODE_BROKER_PORT must be a decimal port number"),
};

pub static NODE_CONFIG: NodeConfig<'static> = NodeConfig::new(
    WifiCredentials::new(env!("NODE_WIFI_SSID"), env!("NODE_WIFI_PASSWORD")),
    BrokerConfig::new(
        env!("NODE_BROKER_HOST"),
        env!("NODE_CLIENT_ID"),
        env!("NODE_TOPIC"),
    )
    .with_port(BROKER_PORT)
    .with_login(env!("NODE_BROKER_USER"), env!("NODE_BROKER_PASSWORD")),
);

/// Parses a non-zero decimal port number.
const fn parse_port(raw: &str) -> Option<u16> {
    let bytes = raw.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let mut value: u32 = 0;
    let mut index = 0;
    while index < bytes.len() {
        let digit = bytes[index];
        if !digit.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (digit - b'0') as u32;
        if value > u16::MAX as u32 {
            return None;
        }
        index += 1;
    }

    if value == 0 { None } else { Some(value as u16) }
}
