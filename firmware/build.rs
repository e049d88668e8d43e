use std::env;
use std::path::Path;

/// Build-time settings surfaced to the firmware through `env!`, with the
/// value used when neither the environment nor `.env` provides one.
const SETTINGS: &[(&str, &str)] = &[
    ("NODE_WIFI_SSID", ""),
    ("NODE_WIFI_PASSWORD", ""),
    ("NODE_BROKER_HOST", "broker.local"),
    ("NODE_BROKER_PORT", "1883"),
    ("NODE_BROKER_USER", ""),
    ("NODE_BROKER_PASSWORD", ""),
    ("NODE_CLIENT_ID", "telemetry-node"),
    ("NODE_TOPIC", "sensors/telemetry-node"),
];

fn main() {
    load_node_settings();

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
}

/// Environment variables take priority over `.env` values.
fn load_node_settings() {
    println!("cargo:rerun-if-changed=.env");
    for (key, _) in SETTINGS {
        println!("cargo:rerun-if-env-changed={key}");
    }

    if Path::new(".env").exists() {
        if let Err(err) = dotenvy::dotenv() {
            println!("cargo:warning=Failed to load .env file: {err}");
        }
    }

    for (key, fallback) in SETTINGS {
        let value = env::var(key)
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|_| (*fallback).to_string());
        println!("cargo:rustc-env={key}={value}");
    }

    if env::var("NODE_WIFI_SSID").map_or(true, |ssid| ssid.trim().is_empty()) {
        println!("cargo:warning=NODE_WIFI_SSID is empty - the node will fail to join");
    }
}
