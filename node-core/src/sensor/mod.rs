//! Sensor sample conversion: pressure normalisation and barometric altitude.

use num_traits::Float;

/// Exponent of the international barometric formula (1 / 5.255).
const BAROMETRIC_EXPONENT: f32 = 0.1903;

/// Altitude scale of the barometric formula, in metres.
const BAROMETRIC_SCALE_M: f32 = 44_330.0;

/// Raw values produced by the sensor service.
///
/// Reads after a successful init always yield a sample; an individual field
/// may be non-finite when the device returned garbage.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SensorSample {
    pub temperature_c: f32,
    pub pressure_pa: f32,
    pub humidity_pct: f32,
}

impl SensorSample {
    pub const fn new(temperature_c: f32, pressure_pa: f32, humidity_pct: f32) -> Self {
        Self {
            temperature_c,
            pressure_pa,
            humidity_pct,
        }
    }

    /// Sample used when the device could not be read at all.
    pub const fn invalid() -> Self {
        Self::new(f32::NAN, f32::NAN, f32::NAN)
    }
}

/// Converts Pascal to hectopascal.
#[must_use]
pub fn pascal_to_hpa(pressure_pa: f32) -> f32 {
    pressure_pa / 100.0
}

/// Altitude in metres for `pressure_hpa` relative to `sea_level_hpa`.
#[must_use]
pub fn altitude_from_pressure(pressure_hpa: f32, sea_level_hpa: f32) -> f32 {
    let ratio = pressure_hpa / sea_level_hpa;
    BAROMETRIC_SCALE_M * (1.0 - ratio.powf(BAROMETRIC_EXPONENT))
}
