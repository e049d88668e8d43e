//! BME280 environmental sensor behind the cycle's sensor contract.

use core::fmt;

use bme280::i2c::BME280;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use node_core::cycle::SensorService;
use node_core::sensor::SensorSample;

use crate::diagnostics;

/// Errors raised while bringing the sensor up.
pub enum SensorError<E> {
    /// The driver reported a bus or calibration failure.
    Driver(bme280::Error<E>),
    /// The bus was handed to the driver by an earlier `init`.
    BusClaimed,
}

impl<E: fmt::Debug> fmt::Debug for SensorError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Driver(err) => write!(f, "driver {err:?}"),
            SensorError::BusClaimed => f.write_str("bus already claimed"),
        }
    }
}

/// BME280 on a blocking I2C bus.
///
/// The address is only known once `init` runs, so the bus is held until then.
pub struct Bme280Sensor<I2C, D> {
    bus: Option<I2C>,
    device: Option<BME280<I2C>>,
    delay: D,
}

impl<I2C, D> Bme280Sensor<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(bus: I2C, delay: D) -> Self {
        Self {
            bus: Some(bus),
            device: None,
            delay,
        }
    }
}

impl<I2C, D> SensorService for Bme280Sensor<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    type Error = SensorError<I2C::Error>;

    fn init(&mut self, address: u8) -> Result<(), Self::Error> {
        let bus = self.bus.take().ok_or(SensorError::BusClaimed)?;
        let mut device = BME280::new(bus, address);
        device.init(&mut self.delay).map_err(SensorError::Driver)?;
        self.device = Some(device);
        Ok(())
    }

    fn read(&mut self) -> SensorSample {
        let Some(device) = self.device.as_mut() else {
            return SensorSample::invalid();
        };

        match device.measure(&mut self.delay) {
            Ok(measurements) => SensorSample::new(
                measurements.temperature,
                measurements.pressure,
                measurements.humidity,
            ),
            Err(_) => {
                diagnostics::log_sensor_fault();
                SensorSample::invalid()
            }
        }
    }
}
