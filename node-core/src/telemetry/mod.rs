//! Sensor reading model and the JSON payload published once per wake cycle.
//!
//! The payload is a flat object with exactly four numeric members in a fixed
//! order. It is rendered straight into a fixed-capacity buffer so the firmware
//! never allocates; values that are not finite are written as `null` because
//! JSON has no encoding for them.

use core::fmt::{self, Write};

use heapless::String;

use crate::sensor::{SensorSample, altitude_from_pressure, pascal_to_hpa};

/// Upper bound on the encoded payload length.
///
/// Four `f32` values rendered without an exponent stay well below this even at
/// the extremes of the type.
pub const MAX_PAYLOAD_LEN: usize = 256;

/// Encoded payload buffer.
pub type Payload = String<MAX_PAYLOAD_LEN>;

/// JSON member names in publication order.
pub const PAYLOAD_FIELDS: [&str; 4] = ["temperature", "pressure", "altitude", "humidity"];

/// One environmental reading in publication units.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SensorReading {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Hectopascal.
    pub pressure: f32,
    /// Metres above the sea-level reference.
    pub altitude: f32,
    /// Relative humidity, percent.
    pub humidity: f32,
}

impl SensorReading {
    pub const fn new(temperature: f32, pressure: f32, altitude: f32, humidity: f32) -> Self {
        Self {
            temperature,
            pressure,
            altitude,
            humidity,
        }
    }

    /// Normalises a raw sample and derives altitude against `sea_level_hpa`.
    #[must_use]
    pub fn from_sample(sample: SensorSample, sea_level_hpa: f32) -> Self {
        let pressure = pascal_to_hpa(sample.pressure_pa);
        Self {
            temperature: sample.temperature_c,
            pressure,
            altitude: altitude_from_pressure(pressure, sea_level_hpa),
            humidity: sample.humidity_pct,
        }
    }

    /// Returns `true` when every field holds a finite value.
    pub fn is_valid(&self) -> bool {
        self.values().iter().all(|value| value.is_finite())
    }

    /// Field values in [`PAYLOAD_FIELDS`] order.
    pub const fn values(&self) -> [f32; 4] {
        [self.temperature, self.pressure, self.altitude, self.humidity]
    }

    /// Encodes the reading as a JSON object.
    pub fn to_payload(&self) -> Result<Payload, PayloadError> {
        let mut payload = Payload::new();
        self.write_json(&mut payload)
            .map_err(|_| PayloadError::Overflow)?;
        Ok(payload)
    }

    fn write_json<W: Write>(&self, out: &mut W) -> fmt::Result {
        out.write_char('{')?;
        for (index, (name, value)) in PAYLOAD_FIELDS.iter().zip(self.values()).enumerate() {
            if index > 0 {
                out.write_char(',')?;
            }
            write!(out, "\"{name}\":")?;
            write_number(out, value)?;
        }
        out.write_char('}')
    }
}

fn write_number<W: Write>(out: &mut W, value: f32) -> fmt::Result {
    if value.is_finite() {
        write!(out, "{value}")
    } else {
        out.write_str("null")
    }
}

/// Failure to build the payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PayloadError {
    /// Encoded payload did not fit in [`MAX_PAYLOAD_LEN`] bytes.
    Overflow,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Overflow => write!(f, "payload exceeds {MAX_PAYLOAD_LEN} bytes"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_fields_in_fixed_order() {
        let reading = SensorReading::new(21.5, 1013.25, 0.0, 45.0);
        let payload = reading.to_payload().expect("payload should fit");

        assert_eq!(
            payload.as_str(),
            r#"{"temperature":21.5,"pressure":1013.25,"altitude":0,"humidity":45}"#
        );
    }

    #[test]
    fn non_finite_values_become_null() {
        let reading = SensorReading::new(f32::NAN, 990.5, f32::INFINITY, 30.25);
        let payload = reading.to_payload().expect("payload should fit");

        assert_eq!(
            payload.as_str(),
            r#"{"temperature":null,"pressure":990.5,"altitude":null,"humidity":30.25}"#
        );
        assert!(!reading.is_valid());
    }

    #[test]
    fn extreme_values_still_fit() {
        let reading = SensorReading::new(f32::MAX, f32::MIN, -f32::MAX, f32::MIN_POSITIVE);
        let payload = reading.to_payload().expect("extremes should fit");

        assert!(payload.len() <= MAX_PAYLOAD_LEN);
        assert!(payload.starts_with("{\"temperature\":"));
    }

    #[test]
    fn from_sample_normalises_pressure_and_derives_altitude() {
        let sample = SensorSample::new(19.0, 101_325.0, 52.0);
        let reading = SensorReading::from_sample(sample, 1013.25);

        assert!((reading.pressure - 1013.25).abs() < 0.001);
        assert!(reading.altitude.abs() < 0.01);
        assert!((reading.temperature - 19.0).abs() < f32::EPSILON);
        assert!((reading.humidity - 52.0).abs() < f32::EPSILON);
        assert!(reading.is_valid());
    }

    #[test]
    fn invalid_sample_yields_invalid_reading() {
        let reading = SensorReading::from_sample(SensorSample::invalid(), 1013.25);
        assert!(!reading.is_valid());
    }
}
