//! Fixed-rate acquisition loop.
//!
//! The loop state is carried in the type: [`Acquisition`] is uninitialized,
//! [`Acquisition::initialize`] turns it into either [`Ready`] (running) or
//! [`Halted`] (terminal). Only `Ready` can produce data lines, so nothing is
//! ever streamed from a sensor that failed to come up.
//!
//! Pacing is tick-boundary relative: each tick sleeps until `sample_period`
//! after its own start, so time spent sampling and writing is absorbed
//! instead of accumulating as drift. A tick that overruns its period is
//! followed immediately by the next one, with no catch-up burst.

use core::convert::Infallible;

use embassy_time::{Duration, Instant};

use crate::clock::TickClock;
use crate::config::{AcquisitionConfig, STATS_WINDOW_MS};
use crate::fmt::DebugFmt;
use crate::link::{write_parts, SerialLink};
use crate::sensor::{ImuSensor, SensorSample};
use crate::wire;

/// Log the first fault of a streak and every this-many after it.
const FAULT_LOG_EVERY: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopState {
    Uninitialized,
    Running,
    HaltedOnFault,
}

/// Fatal startup conditions. Both halt the loop for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// The sensor did not answer the probe.
    SensorNotFound,
    /// The sensor answered but rejected its range/filter setup.
    ConfigureFailed,
}

/// Why a running tick produced no sample. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleFault {
    /// The bus transaction failed.
    Bus,
    /// The reading cannot be written as a data line (NaN or infinite).
    Unrepresentable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    Emitted(SensorSample),
    /// Sampled and sequenced, but the link refused the line.
    EmitFailed(SensorSample),
    /// Nothing written this tick.
    Skipped(SampleFault),
}

impl TickOutcome {
    pub fn sample(&self) -> Option<&SensorSample> {
        match self {
            Self::Emitted(s) | Self::EmitFailed(s) => Some(s),
            Self::Skipped(_) => None,
        }
    }
}

/// Running totals since the loop entered `Running`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamStats {
    pub emitted: u64,
    pub skipped: u64,
    pub link_errors: u64,
    pub overruns: u64,
}

struct StatsWindow {
    started: Instant,
    lines: u32,
    skipped: u32,
    overruns: u32,
}

impl StatsWindow {
    fn new(started: Instant) -> Self {
        Self {
            started,
            lines: 0,
            skipped: 0,
            overruns: 0,
        }
    }
}

/// The loop before its startup gate.
pub struct Acquisition<S, L, C> {
    sensor: S,
    link: L,
    clock: C,
    config: AcquisitionConfig,
}

impl<S, L, C> Acquisition<S, L, C>
where
    S: ImuSensor,
    L: SerialLink,
    C: TickClock,
{
    /// `link` is expected to be open at `config.baud_rate` already.
    pub fn new(sensor: S, link: L, clock: C, config: AcquisitionConfig) -> Self {
        Self {
            sensor,
            link,
            clock,
            config,
        }
    }

    pub fn state(&self) -> LoopState {
        LoopState::Uninitialized
    }

    /// Waits for the link, probes and configures the sensor, then lets it
    /// settle. Any failure is terminal: the returned [`Halted`] has no way
    /// back to streaming.
    pub async fn initialize(mut self) -> Result<Ready<S, L, C>, Halted> {
        self.link.wait_ready().await;
        info!("Link ready at {} baud", self.config.baud_rate);

        if let Err(e) = self.sensor.begin().await {
            error!("{} not found: {:?}", S::NAME, DebugFmt(&e));
            self.announce(&[wire::MISSING_PREFIX, S::NAME, wire::MISSING_SUFFIX])
                .await;
            return Err(Halted::new(InitError::SensorNotFound));
        }
        info!("{} found", S::NAME);
        self.announce(&[S::NAME, wire::FOUND_SUFFIX]).await;

        if let Err(e) = self.sensor.configure(self.config.sensor_settings()).await {
            error!("{} configuration failed: {:?}", S::NAME, DebugFmt(&e));
            self.announce(&[wire::UNCONFIGURED_PREFIX, S::NAME, wire::UNCONFIGURED_SUFFIX]).await;
            return Err(Halted::new(InitError::ConfigureFailed));
        }

        let settled = self.clock.now() + self.config.settle_time;
        self.clock.sleep_until(settled).await;

        let now = self.clock.now();
        Ok(Ready {
            sensor: self.sensor,
            link: self.link,
            clock: self.clock,
            config: self.config,
            next_seq: 0,
            consecutive_faults: 0,
            stats: StreamStats::default(),
            window: StatsWindow::new(now),
        })
    }

    async fn announce(&mut self, parts: &[&str]) {
        if let Err(e) = write_parts(&mut self.link, parts).await {
            warn!("Diagnostic line lost: {:?}", DebugFmt(&e));
        }
    }
}

/// Terminal state after a failed startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Halted {
    error: InitError,
}

impl Halted {
    fn new(error: InitError) -> Self {
        Self { error }
    }

    pub fn error(&self) -> InitError {
        self.error
    }

    pub fn state(&self) -> LoopState {
        LoopState::HaltedOnFault
    }

    /// Never resolves. Only a reset gets the device out of here.
    pub async fn park(self) -> Infallible {
        core::future::pending().await
    }
}

impl From<Halted> for InitError {
    fn from(h: Halted) -> Self {
        h.error
    }
}

/// The running loop.
pub struct Ready<S, L, C> {
    sensor: S,
    link: L,
    clock: C,
    config: AcquisitionConfig,
    next_seq: u64,
    consecutive_faults: u32,
    stats: StreamStats,
    window: StatsWindow,
}

impl<S, L, C> Ready<S, L, C>
where
    S: ImuSensor,
    L: SerialLink,
    C: TickClock,
{
    pub fn state(&self) -> LoopState {
        LoopState::Running
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Sequence number the next accepted sample will carry.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub async fn run_forever(mut self) -> Infallible {
        info!(
            "Streaming every {} ms",
            self.config.sample_period.as_millis()
        );
        loop {
            self.tick().await;
        }
    }

    /// One iteration: sample, format, emit, then sleep out the rest of the
    /// period.
    pub async fn tick(&mut self) -> TickOutcome {
        let started = self.clock.now();
        let outcome = self.acquire_and_emit(started).await;
        self.record(&outcome);
        self.pace(started).await;
        self.report_window();
        outcome
    }

    async fn acquire_and_emit(&mut self, started: Instant) -> TickOutcome {
        let reading = match self.sensor.sample().await {
            Ok(reading) => reading,
            Err(e) => {
                self.consecutive_faults = self.consecutive_faults.saturating_add(1);
                if self.consecutive_faults % FAULT_LOG_EVERY == 1 {
                    warn!(
                        "Sample fault #{} ({} in a row): {:?}",
                        self.stats.skipped + 1,
                        self.consecutive_faults,
                        DebugFmt(&e)
                    );
                }
                return TickOutcome::Skipped(SampleFault::Bus);
            }
        };

        let line = match wire::format_accel_line(&reading.accel) {
            Ok(line) => line,
            Err(e) => {
                self.consecutive_faults = self.consecutive_faults.saturating_add(1);
                if self.consecutive_faults % FAULT_LOG_EVERY == 1 {
                    warn!("Unrepresentable reading: {:?}", e);
                }
                return TickOutcome::Skipped(SampleFault::Unrepresentable);
            }
        };

        if self.consecutive_faults > 0 {
            info!(
                "{} recovered after {} consecutive faults",
                S::NAME,
                self.consecutive_faults
            );
            self.consecutive_faults = 0;
        }

        let sample = SensorSample::from_reading(reading, self.next_seq, started);
        self.next_seq += 1;

        match write_parts(&mut self.link, &[line.as_str()]).await {
            Ok(()) => TickOutcome::Emitted(sample),
            Err(e) => {
                warn!("Line {} lost on link: {:?}", sample.seq, DebugFmt(&e));
                TickOutcome::EmitFailed(sample)
            }
        }
    }

    fn record(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Emitted(_) => {
                self.stats.emitted += 1;
                self.window.lines += 1;
            }
            TickOutcome::EmitFailed(_) => self.stats.link_errors += 1,
            TickOutcome::Skipped(_) => {
                self.stats.skipped += 1;
                self.window.skipped += 1;
            }
        }
    }

    async fn pace(&mut self, started: Instant) {
        let deadline = started + self.config.sample_period;
        let now = self.clock.now();
        if now < deadline {
            self.clock.sleep_until(deadline).await;
        } else if now > deadline {
            self.stats.overruns += 1;
            self.window.overruns += 1;
            debug!(
                "Tick overran its period by {} us",
                (now - deadline).as_micros()
            );
        }
    }

    fn report_window(&mut self) {
        let now = self.clock.now();
        if now.duration_since(self.window.started) >= Duration::from_millis(STATS_WINDOW_MS) {
            info!(
                "Stream: {} lines/s, {} skipped, {} overruns",
                self.window.lines,
                self.window.skipped,
                self.window.overruns
            );
            self.window = StatsWindow::new(now);
        }
    }
}
