//! InvenSense MPU-6050 driver
//! ===========================================================
//!
//! Register-level driver over any `embedded-hal-async` I²C bus. Only what
//! the stream needs: probe/reset, range and filter setup, and a single
//! 14-byte burst read of accel, temperature and gyro.

use core::f32::consts::PI;

use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use crate::sensor::{AccelRange, GyroRange, ImuSensor, SensorReading, SensorSettings, Vector3};

// MPU6050 I2C addresses
pub const MPU6050_ADDRESS_AD0_LOW: u8 = 0x68;
pub const MPU6050_ADDRESS_AD0_HIGH: u8 = 0x69;

// MPU6050 Register Addresses
const REG_SMPLRT_DIV: u8 = 0x19;
const REG_CONFIG: u8 = 0x1A;
const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_SIGNAL_PATH_RESET: u8 = 0x68;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;

// MPU6050 ID
const MPU6050_ID: u8 = 0x68;

const PWR_MGMT_1_DEVICE_RESET: u8 = 0x80;
const CLOCK_PLL_XGYRO: u8 = 0x01;
const SIGNAL_PATH_RESET_ALL: u8 = 0x07; // gyro | accel | temp
const RANGE_MASK: u8 = 0b0001_1000;
const DLPF_MASK: u8 = 0b0000_0111;

const STANDARD_GRAVITY: f32 = 9.80665;
const TEMP_LSB_PER_C: f32 = 340.0;
const TEMP_OFFSET_C: f32 = 36.53;

const PROBE_RETRIES: u8 = 3;
const WRITE_RETRIES: u8 = 3;
const RESET_POLLS: u8 = 20;

/* ------------------------------------------------------------------------- */
/*  Error enum                                                               */
/* ------------------------------------------------------------------------- */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mpu6050Error<E> {
    Bus(E),
    /// WHO_AM_I answered with something other than 0x68.
    WrongDevice(u8),
    /// DEVICE_RESET never self-cleared.
    ResetTimeout,
}

impl<E> From<E> for Mpu6050Error<E> {
    fn from(e: E) -> Self {
        Self::Bus(e)
    }
}

/// Raw register frame: accel, temperature, gyro in burst order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawFrame {
    pub accel: [i16; 3],
    pub temp: i16,
    pub gyro: [i16; 3],
}

impl RawFrame {
    pub fn from_bytes(b: [u8; 14]) -> Self {
        let word = |i: usize| i16::from_be_bytes([b[i], b[i + 1]]);
        Self {
            accel: [word(0), word(2), word(4)],
            temp: word(6),
            gyro: [word(8), word(10), word(12)],
        }
    }

    pub fn scaled(&self, accel_range: AccelRange, gyro_range: GyroRange) -> SensorReading {
        let accel_scale = STANDARD_GRAVITY / accel_range.lsb_per_g();
        let gyro_scale = (PI / 180.0) / gyro_range.lsb_per_dps();
        SensorReading {
            accel: Vector3::new(
                self.accel[0] as f32 * accel_scale,
                self.accel[1] as f32 * accel_scale,
                self.accel[2] as f32 * accel_scale,
            ),
            gyro: Vector3::new(
                self.gyro[0] as f32 * gyro_scale,
                self.gyro[1] as f32 * gyro_scale,
                self.gyro[2] as f32 * gyro_scale,
            ),
            temperature: self.temp as f32 / TEMP_LSB_PER_C + TEMP_OFFSET_C,
        }
    }
}

/* ------------------------------------------------------------------------- */
/*  Main driver struct                                                       */
/* ------------------------------------------------------------------------- */
pub struct Mpu6050<I, D> {
    i2c: I,
    delay: D,
    addr: u8,
    accel_range: AccelRange,
    gyro_range: GyroRange,
}

impl<I, D> Mpu6050<I, D>
where
    I: I2c,
    D: DelayNs,
{
    /// Ranges start at the power-on defaults (±2 g, ±250 °/s) until
    /// [`ImuSensor::configure`] runs.
    pub fn new(i2c: I, delay: D, addr: u8) -> Self {
        Self {
            i2c,
            delay,
            addr,
            accel_range: AccelRange::G2,
            gyro_range: GyroRange::Deg250,
        }
    }

    /// Returns the bus and delay, consuming the driver.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    async fn probe(&mut self) -> Result<(), Mpu6050Error<I::Error>> {
        let id = self.read_byte_with_retries(REG_WHO_AM_I, PROBE_RETRIES).await?;
        if id != MPU6050_ID {
            error!("Invalid MPU6050 ID: 0x{:02X}, expected 0x{:02X}", id, MPU6050_ID);
            return Err(Mpu6050Error::WrongDevice(id));
        }
        debug!("MPU6050 chip ID verified: 0x{:02X}", id);
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), Mpu6050Error<I::Error>> {
        self.write_byte_with_retries(REG_PWR_MGMT_1, PWR_MGMT_1_DEVICE_RESET, WRITE_RETRIES)
            .await?;

        let mut cleared = false;
        for _ in 0..RESET_POLLS {
            self.delay.delay_ms(10).await;
            if let Ok(v) = self.read_byte(REG_PWR_MGMT_1).await {
                if v & PWR_MGMT_1_DEVICE_RESET == 0 {
                    cleared = true;
                    break;
                }
            }
        }
        if !cleared {
            error!("Timeout waiting for MPU6050 reset");
            return Err(Mpu6050Error::ResetTimeout);
        }
        self.delay.delay_ms(100).await;

        self.write_byte_with_retries(REG_SIGNAL_PATH_RESET, SIGNAL_PATH_RESET_ALL, WRITE_RETRIES)
            .await?;
        self.delay.delay_ms(100).await;
        Ok(())
    }

    /// Burst-reads accel, temperature and gyro in one transaction so the
    /// three come from the same internal sample.
    pub async fn read_raw(&mut self) -> Result<RawFrame, Mpu6050Error<I::Error>> {
        let buf = self.read_bytes::<14>(REG_ACCEL_XOUT_H).await?;
        Ok(RawFrame::from_bytes(buf))
    }

    async fn update_bits(
        &mut self,
        reg: u8,
        mask: u8,
        bits: u8,
    ) -> Result<(), Mpu6050Error<I::Error>> {
        let current = self.read_byte_with_retries(reg, WRITE_RETRIES).await?;
        let value = (current & !mask) | (bits & mask);
        self.write_byte_with_retries(reg, value, WRITE_RETRIES).await
    }

    async fn read_byte_with_retries(
        &mut self,
        reg: u8,
        retries: u8,
    ) -> Result<u8, Mpu6050Error<I::Error>> {
        let mut attempt = 1;
        loop {
            match self.read_byte(reg).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= retries => return Err(e.into()),
                Err(_) => {
                    attempt += 1;
                    self.delay.delay_ms(10).await;
                }
            }
        }
    }

    async fn write_byte_with_retries(
        &mut self,
        reg: u8,
        value: u8,
        retries: u8,
    ) -> Result<(), Mpu6050Error<I::Error>> {
        let mut attempt = 1;
        loop {
            match self.write_byte(reg, value).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= retries => return Err(e.into()),
                Err(_) => {
                    attempt += 1;
                    self.delay.delay_ms(10).await;
                }
            }
        }
    }

    async fn write_byte(&mut self, reg: u8, value: u8) -> Result<(), I::Error> {
        self.i2c.write(self.addr, &[reg, value]).await
    }

    async fn read_byte(&mut self, reg: u8) -> Result<u8, I::Error> {
        let mut buf = [0u8; 1];
        self.i2c.write_read(self.addr, &[reg], &mut buf).await?;
        Ok(buf[0])
    }

    async fn read_bytes<const N: usize>(&mut self, reg: u8) -> Result<[u8; N], I::Error> {
        let mut buf = [0u8; N];
        self.i2c.write_read(self.addr, &[reg], &mut buf).await?;
        Ok(buf)
    }
}

impl<I, D> ImuSensor for Mpu6050<I, D>
where
    I: I2c,
    D: DelayNs,
{
    type Error = Mpu6050Error<I::Error>;

    const NAME: &'static str = "MPU6050";

    async fn begin(&mut self) -> Result<(), Self::Error> {
        info!("Starting MPU6050 initialization sequence...");
        self.probe().await?;
        self.reset().await?;
        self.write_byte_with_retries(REG_SMPLRT_DIV, 0, WRITE_RETRIES).await?;
        self.write_byte_with_retries(REG_PWR_MGMT_1, CLOCK_PLL_XGYRO, WRITE_RETRIES)
            .await?;
        self.delay.delay_ms(100).await;
        info!("MPU6050 initialization completed successfully");
        Ok(())
    }

    async fn configure(&mut self, settings: SensorSettings) -> Result<(), Self::Error> {
        self.update_bits(REG_ACCEL_CONFIG, RANGE_MASK, (settings.accel_range as u8) << 3)
            .await?;
        self.accel_range = settings.accel_range;

        self.update_bits(REG_GYRO_CONFIG, RANGE_MASK, (settings.gyro_range as u8) << 3)
            .await?;
        self.gyro_range = settings.gyro_range;

        self.update_bits(REG_CONFIG, DLPF_MASK, settings.filter_bandwidth as u8)
            .await?;

        info!(
            "MPU6050 configured: accel {}, gyro {}, dlpf {}",
            settings.accel_range as u8,
            settings.gyro_range as u8,
            settings.filter_bandwidth as u8
        );
        Ok(())
    }

    async fn sample(&mut self) -> Result<SensorReading, Self::Error> {
        let raw = self.read_raw().await?;
        Ok(raw.scaled(self.accel_range, self.gyro_range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use embassy_futures::block_on;
    use embedded_hal_async::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    /// In-memory register file answering at one address.
    struct FakeBus {
        addr: u8,
        regs: [u8; 128],
        ptr: usize,
        present: bool,
        stuck_reset: bool,
        writes: std::vec::Vec<(u8, u8)>,
    }

    impl FakeBus {
        fn mpu6050() -> Self {
            let mut regs = [0u8; 128];
            regs[REG_WHO_AM_I as usize] = MPU6050_ID;
            regs[REG_PWR_MGMT_1 as usize] = 0x40; // asleep after power-on
            Self {
                addr: MPU6050_ADDRESS_AD0_LOW,
                regs,
                ptr: 0,
                present: true,
                stuck_reset: false,
                writes: std::vec::Vec::new(),
            }
        }

        fn absent() -> Self {
            Self {
                present: false,
                ..Self::mpu6050()
            }
        }

        fn write_reg(&mut self, reg: usize, value: u8) {
            self.writes.push((reg as u8, value));
            if reg == REG_PWR_MGMT_1 as usize && value & PWR_MGMT_1_DEVICE_RESET != 0 {
                self.regs[reg] = if self.stuck_reset { value } else { 0x40 };
                return;
            }
            self.regs[reg] = value;
        }
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if !self.present || address != self.addr {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        if let Some((&reg, data)) = bytes.split_first() {
                            self.ptr = reg as usize;
                            for &b in data {
                                let reg = self.ptr;
                                self.write_reg(reg, b);
                                self.ptr += 1;
                            }
                        }
                    }
                    Operation::Read(buf) => {
                        for b in buf.iter_mut() {
                            *b = self.regs[self.ptr];
                            self.ptr += 1;
                        }
                    }
                }
            }
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    fn load_frame(bus: &mut FakeBus, frame: RawFrame) {
        let words = [
            frame.accel[0],
            frame.accel[1],
            frame.accel[2],
            frame.temp,
            frame.gyro[0],
            frame.gyro[1],
            frame.gyro[2],
        ];
        for (i, w) in words.iter().enumerate() {
            let [hi, lo] = w.to_be_bytes();
            bus.regs[REG_ACCEL_XOUT_H as usize + 2 * i] = hi;
            bus.regs[REG_ACCEL_XOUT_H as usize + 2 * i + 1] = lo;
        }
    }

    fn settings() -> SensorSettings {
        SensorSettings {
            accel_range: AccelRange::G8,
            gyro_range: GyroRange::Deg500,
            filter_bandwidth: crate::sensor::FilterBandwidth::Hz21,
        }
    }

    #[test]
    fn begin_wakes_device_with_pll_clock() {
        let mut imu = Mpu6050::new(FakeBus::mpu6050(), NoDelay, MPU6050_ADDRESS_AD0_LOW);
        block_on(imu.begin()).unwrap();

        let (bus, _) = imu.release();
        assert_eq!(bus.regs[REG_PWR_MGMT_1 as usize], CLOCK_PLL_XGYRO);
        assert_eq!(bus.regs[REG_SMPLRT_DIV as usize], 0);
        assert!(bus.writes.contains(&(REG_PWR_MGMT_1, PWR_MGMT_1_DEVICE_RESET)));
        assert!(bus.writes.contains(&(REG_SIGNAL_PATH_RESET, SIGNAL_PATH_RESET_ALL)));
    }

    #[test]
    fn begin_fails_when_nothing_answers() {
        let mut imu = Mpu6050::new(FakeBus::absent(), NoDelay, MPU6050_ADDRESS_AD0_LOW);
        let err = block_on(imu.begin()).unwrap_err();
        assert_eq!(
            err,
            Mpu6050Error::Bus(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        );
    }

    #[test]
    fn begin_fails_on_wrong_address() {
        let mut imu = Mpu6050::new(FakeBus::mpu6050(), NoDelay, MPU6050_ADDRESS_AD0_HIGH);
        assert!(matches!(block_on(imu.begin()), Err(Mpu6050Error::Bus(_))));
    }

    #[test]
    fn begin_rejects_other_chips() {
        let mut bus = FakeBus::mpu6050();
        bus.regs[REG_WHO_AM_I as usize] = 0x71; // MPU9250
        let mut imu = Mpu6050::new(bus, NoDelay, MPU6050_ADDRESS_AD0_LOW);
        assert_eq!(block_on(imu.begin()), Err(Mpu6050Error::WrongDevice(0x71)));
    }

    #[test]
    fn begin_times_out_when_reset_never_clears() {
        let mut bus = FakeBus::mpu6050();
        bus.stuck_reset = true;
        let mut imu = Mpu6050::new(bus, NoDelay, MPU6050_ADDRESS_AD0_LOW);
        assert_eq!(block_on(imu.begin()), Err(Mpu6050Error::ResetTimeout));
    }

    #[test]
    fn configure_touches_only_range_and_filter_bits() {
        let mut bus = FakeBus::mpu6050();
        bus.regs[REG_ACCEL_CONFIG as usize] = 0b1110_0111; // self-test + HPF bits
        bus.regs[REG_GYRO_CONFIG as usize] = 0b1110_0000;
        bus.regs[REG_CONFIG as usize] = 0b0011_1000; // EXT_SYNC_SET
        let mut imu = Mpu6050::new(bus, NoDelay, MPU6050_ADDRESS_AD0_LOW);

        block_on(imu.configure(settings())).unwrap();

        let (bus, _) = imu.release();
        assert_eq!(bus.regs[REG_ACCEL_CONFIG as usize], 0b1111_0111);
        assert_eq!(bus.regs[REG_GYRO_CONFIG as usize], 0b1110_1000);
        assert_eq!(bus.regs[REG_CONFIG as usize], 0b0011_1100);
    }

    #[test]
    fn sample_scales_with_configured_ranges() {
        let mut bus = FakeBus::mpu6050();
        load_frame(
            &mut bus,
            RawFrame {
                accel: [4096, -2048, 0],
                temp: -340,
                gyro: [655, 0, -655],
            },
        );
        let mut imu = Mpu6050::new(bus, NoDelay, MPU6050_ADDRESS_AD0_LOW);
        block_on(imu.configure(settings())).unwrap();

        let reading = block_on(imu.sample()).unwrap();
        assert_abs_diff_eq!(reading.accel.x, STANDARD_GRAVITY, epsilon = 1e-4);
        assert_abs_diff_eq!(reading.accel.y, -STANDARD_GRAVITY / 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(reading.accel.z, 0.0);
        assert_abs_diff_eq!(reading.gyro.x, 10.0f32.to_radians(), epsilon = 1e-4);
        assert_abs_diff_eq!(reading.gyro.z, -10.0f32.to_radians(), epsilon = 1e-4);
        assert_abs_diff_eq!(reading.temperature, 35.53, epsilon = 1e-4);
    }

    #[test]
    fn raw_frame_is_big_endian_in_burst_order() {
        let bytes = [
            0x01, 0x02, 0xFF, 0xFE, 0x00, 0x00, // accel
            0x0B, 0xB8, // temp
            0x80, 0x00, 0x7F, 0xFF, 0x00, 0x10, // gyro
        ];
        let frame = RawFrame::from_bytes(bytes);
        assert_eq!(frame.accel, [0x0102, -2, 0]);
        assert_eq!(frame.temp, 3000);
        assert_eq!(frame.gyro, [i16::MIN, i16::MAX, 16]);
    }
}
