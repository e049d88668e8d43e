#![no_std]

// Shared logic for the battery-powered telemetry node.
//
// The wake-cycle state machine lives here so the firmware and the host
// emulator drive exactly the same step ordering and power-down rules.
// Nothing in this crate touches the standard library or a concrete HAL.

pub mod clock;
pub mod config;
pub mod cycle;
pub mod diagnostics;
pub mod join;
pub mod modem;
pub mod power;
pub mod sensor;
pub mod telemetry;
