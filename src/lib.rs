#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod acquisition;
#[cfg(feature = "firmware")]
pub mod board;
pub mod clock;
pub mod config;
pub mod drivers;
pub mod link;
pub mod sensor;
pub mod wire;

pub use acquisition::{
    Acquisition, Halted, InitError, LoopState, Ready, SampleFault, StreamStats, TickOutcome,
};
#[cfg(feature = "firmware")]
pub use board::Board;
pub use config::AcquisitionConfig;
pub use sensor::{ImuSensor, SensorReading, SensorSample, Vector3};
