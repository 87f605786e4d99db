//! Inertial sensor capability and the data it produces.

use embassy_time::Instant;

// Data structures
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One acquisition as handed back by [`ImuSensor::sample`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorReading {
    pub accel: Vector3,     // m/s²
    pub gyro: Vector3,      // rad/s
    pub temperature: f32,   // °C
}

/// A reading accepted into the stream.
///
/// `seq` counts accepted samples from zero with no gaps; `taken_at` is the
/// start of the tick that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorSample {
    pub accel: Vector3,
    pub gyro: Vector3,
    pub temperature: f32,
    pub seq: u64,
    pub taken_at: Instant,
}

impl SensorSample {
    pub fn from_reading(reading: SensorReading, seq: u64, taken_at: Instant) -> Self {
        Self {
            accel: reading.accel,
            gyro: reading.gyro,
            temperature: reading.temperature,
            seq,
            taken_at,
        }
    }
}

/// Accelerometer full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRange {
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

impl AccelRange {
    /// Raw counts per g.
    pub const fn lsb_per_g(self) -> f32 {
        match self {
            Self::G2 => 16384.0,
            Self::G4 => 8192.0,
            Self::G8 => 4096.0,
            Self::G16 => 2048.0,
        }
    }
}

/// Gyroscope full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroRange {
    Deg250 = 0,
    Deg500 = 1,
    Deg1000 = 2,
    Deg2000 = 3,
}

impl GyroRange {
    /// Raw counts per degree per second.
    pub const fn lsb_per_dps(self) -> f32 {
        match self {
            Self::Deg250 => 131.0,
            Self::Deg500 => 65.5,
            Self::Deg1000 => 32.8,
            Self::Deg2000 => 16.4,
        }
    }
}

/// Digital low-pass filter bandwidth. Discriminants are the DLPF_CFG codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterBandwidth {
    Hz260 = 0,
    Hz184 = 1,
    Hz94 = 2,
    Hz44 = 3,
    Hz21 = 4,
    Hz10 = 5,
    Hz5 = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorSettings {
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
    pub filter_bandwidth: FilterBandwidth,
}

/// The sensor as the acquisition loop sees it.
#[allow(async_fn_in_trait)]
pub trait ImuSensor {
    type Error: core::fmt::Debug;

    /// Short chip name used in the startup diagnostics.
    const NAME: &'static str;

    /// Probe and wake the device. An error means nothing usable answered.
    async fn begin(&mut self) -> Result<(), Self::Error>;

    async fn configure(&mut self, settings: SensorSettings) -> Result<(), Self::Error>;

    /// One bus transaction's worth of data, already scaled to SI units.
    async fn sample(&mut self) -> Result<SensorReading, Self::Error>;
}
