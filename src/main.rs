#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_time::Delay;
use {defmt_rtt as _, panic_probe as _};

use mpu6050_stream::{
    clock::EmbassyClock,
    drivers::mpu6050::{Mpu6050, MPU6050_ADDRESS_AD0_LOW},
    Acquisition, AcquisitionConfig, Board,
};

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("Starting mpu6050-stream");
    let config = AcquisitionConfig::new();
    let board = Board::init(&config);

    let imu = Mpu6050::new(board.i2c, Delay, MPU6050_ADDRESS_AD0_LOW);
    let acquisition = Acquisition::new(imu, board.console, EmbassyClock, config);

    // Single thread of control: the loop runs here and never returns.
    match acquisition.initialize().await {
        Ok(ready) => match ready.run_forever().await {},
        Err(halted) => {
            error!("Acquisition halted: {}", halted.error());
            match halted.park().await {}
        }
    }
}
