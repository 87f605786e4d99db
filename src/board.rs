use embassy_stm32::mode::Async;
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{Config as UsartConfig, Uart, UartTx};
use embassy_stm32::{bind_interrupts, gpio::Pull, i2c, peripherals, rcc, usart, Config};
use embedded_io_async::{ErrorType, Write};

use crate::config::{AcquisitionConfig, I2C_FREQUENCY_HZ};
use crate::link::SerialLink;

// ── IRQ table ─────────────────────────────────────────────
bind_interrupts!(pub struct Irqs {
    USART2 => usart::InterruptHandler<peripherals::USART2>;
    I2C2   => i2c::EventInterruptHandler<peripherals::I2C2>,
              i2c::ErrorInterruptHandler<peripherals::I2C2>;
});

// ── Board struct ──────────────────────────────────────────
pub struct Board {
    pub i2c: i2c::I2c<'static, Async>, // DMA
    pub console: UartLink,             // ST-LINK virtual COM port
}

impl Board {
    pub fn init(acq: &AcquisitionConfig) -> Self {
        let mut config = Config::default();

        // HSI16 -> PLL -> 64MHz SYSCLK
        config.rcc.hsi = Some(rcc::Hsi {
            sys_div: rcc::HsiSysDiv::DIV1,
        });
        config.rcc.pll = Some(rcc::Pll {
            source: rcc::PllSource::HSI,    // Use HSI as PLL source
            prediv: rcc::PllPreDiv::DIV2,   // 16MHz / 2 = 8MHz
            mul: rcc::PllMul::MUL16,        // 8MHz * 16 = 128MHz
            divp: None,                     // Not used
            divq: None,                     // Not used
            divr: Some(rcc::PllRDiv::DIV2), // 128MHz / 2 = 64MHz
        });
        config.rcc.sys = rcc::Sysclk::PLL1_R;
        let p = embassy_stm32::init(config);

        // USART2 on PA2/PA3 is wired to the ST-LINK VCP on Nucleo-G071RB.
        let mut us_cfg = UsartConfig::default();
        us_cfg.baudrate = acq.baud_rate;
        us_cfg.rx_pull = Pull::Up;

        let uart = defmt::unwrap!(Uart::new(
            p.USART2, p.PA3, p.PA2, Irqs, p.DMA1_CH2, p.DMA1_CH3, us_cfg
        ));
        let (tx, _rx) = uart.split();

        // I²C2 (DMA CH7 TX, CH6 RX), SCL PB10 / SDA PB11
        let mut i2c_cfg = i2c::Config::default();
        i2c_cfg.sda_pullup = false; // GY-521 carries its own pull-ups
        i2c_cfg.scl_pullup = false;

        let i2c = i2c::I2c::new(
            p.I2C2,
            p.PB10,
            p.PB11,
            Irqs,
            p.DMA1_CH7,
            p.DMA1_CH6,
            Hertz(I2C_FREQUENCY_HZ),
            i2c_cfg,
        );

        Self {
            i2c,
            console: UartLink { tx },
        }
    }
}

/// TX half of the console UART as a [`SerialLink`].
pub struct UartLink {
    tx: UartTx<'static, Async>,
}

impl ErrorType for UartLink {
    type Error = <UartTx<'static, Async> as ErrorType>::Error;
}

impl Write for UartLink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Write::write(&mut self.tx, buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Write::flush(&mut self.tx).await
    }
}

impl SerialLink for UartLink {
    // A bare UART has no carrier or DTR to wait on: it is ready once clocked.
    async fn wait_ready(&mut self) {}
}
