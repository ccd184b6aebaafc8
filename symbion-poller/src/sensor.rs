//! DHT22 through the Linux IIO `dht11` driver
//!
//! With `dtoverlay=dht11,gpiopin=4` the driver exposes the sensor under
//! `/sys/bus/iio/devices/iio:deviceN/`; each read triggers a fresh
//! measurement and fails with EIO/ETIMEDOUT when the bus transfer is corrupt.

use crate::source::{SensorDevice, SensorError, SensorSample};
use std::io::ErrorKind;
use std::path::Path;

const TEMPERATURE_FILE: &str = "in_temp_input";
const HUMIDITY_FILE: &str = "in_humidityrelative_input";

/// Sensor whose target address is the IIO device directory
#[derive(Debug, Default, Clone, Copy)]
pub struct IioSensor;

impl SensorDevice for IioSensor {
    fn read(&self, address: &str) -> Result<SensorSample, SensorError> {
        let device = Path::new(address);
        let temperature = read_milli(&device.join(TEMPERATURE_FILE))?;
        let humidity = read_milli(&device.join(HUMIDITY_FILE))?;

        Ok(SensorSample {
            temperature_c: temperature / 1000.0,
            humidity: humidity / 1000.0,
        })
    }
}

/// Driver values are integers in thousandths (m°C, m%RH)
fn read_milli(path: &Path) -> Result<f64, SensorError> {
    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => SensorError::Unavailable(e),
        _ => SensorError::Transient(format!("{}: {e}", path.display())),
    })?;

    raw.trim()
        .parse::<i64>()
        .map(|value| value as f64)
        .map_err(|_| SensorError::Transient(format!("unparsable value {:?} in {}", raw.trim(), path.display())))
}
