use embassy_time::Duration;

use crate::sensor::{AccelRange, FilterBandwidth, GyroRange, SensorSettings};

// Centralize all configuration constants
pub const SAMPLE_PERIOD_MS: u64 = 50;
pub const UART_BAUDRATE: u32 = 115_200;
pub const I2C_FREQUENCY_HZ: u32 = 100_000;
pub const SENSOR_SETTLE_MS: u64 = 100;
pub const STATS_WINDOW_MS: u64 = 1000;

pub const ACCEL_RANGE: AccelRange = AccelRange::G8;
pub const GYRO_RANGE: GyroRange = GyroRange::Deg500;
pub const FILTER_BANDWIDTH: FilterBandwidth = FilterBandwidth::Hz21;

/// Startup configuration of the acquisition loop. Read-only once the loop
/// is built.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AcquisitionConfig {
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
    pub filter_bandwidth: FilterBandwidth,
    pub sample_period: Duration,
    pub baud_rate: u32,
    /// Quiet time after configuring the sensor, before the first tick.
    pub settle_time: Duration,
}

impl AcquisitionConfig {
    pub const fn new() -> Self {
        Self {
            accel_range: ACCEL_RANGE,
            gyro_range: GYRO_RANGE,
            filter_bandwidth: FILTER_BANDWIDTH,
            sample_period: Duration::from_millis(SAMPLE_PERIOD_MS),
            baud_rate: UART_BAUDRATE,
            settle_time: Duration::from_millis(SENSOR_SETTLE_MS),
        }
    }

    pub const fn with_sample_period(mut self, sample_period: Duration) -> Self {
        self.sample_period = sample_period;
        self
    }

    pub const fn sensor_settings(&self) -> SensorSettings {
        SensorSettings {
            accel_range: self.accel_range,
            gyro_range: self.gyro_range,
            filter_bandwidth: self.filter_bandwidth,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self::new()
    }
}
