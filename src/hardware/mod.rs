//! Board support for the STM32F405 bring-up board.
//!
//! | Function | Pins |
//! | -------- | ---- |
//! | Console, USART2 | PA2 TX, PA3 RX |
//! | LEDs | PD12 green, PD13 orange, PD14 red, PD15 blue |
//! | User / boot button | PA0, active high |
//! | SPI2 | PB13 SCK, PB14 MISO, PB15 MOSI |
//! | TFT | PB12 CS, PB11 D/C, PB10 RST, PB1 backlight |
//! | NOR flash | PC6 CS |
//! | Touch | PC7 CS, PC8 PENIRQ |
//! | I2C1 | PB8 SCL, PB9 SDA, PB5 IMU INT |
//! | 1-Wire | PA1, open drain, 4k7 pull-up |
//! | USB OTG FS | PA11 DM, PA12 DP |

use embedded_hal::spi::MODE_0;
use fugit::HertzU32;
use hal::gpio::{Output, Pin, PinState};
use hal::i2c::I2c1;
use hal::pac;
use hal::prelude::*;
use hal::rcc::Clocks;
use hal::spi::{Spi, Spi2};
use stm32f4xx_hal as hal;

pub mod chrono;
pub mod display;
pub mod flash;
pub mod serial;

pub const HSE: HertzU32 = HertzU32::MHz(8);
pub const SYSCLK: HertzU32 = HertzU32::MHz(168);
pub const SPI2_FREQ: HertzU32 = HertzU32::MHz(8);
/// The touch controller converts during the transfer and needs a slower clock.
pub const TOUCH_FREQ: HertzU32 = HertzU32::MHz(2);
pub const I2C1_FREQ: HertzU32 = HertzU32::kHz(400);

pub type Led = Pin<'D', 12, Output>;
pub type Button = Pin<'A', 0>;
pub type SpiClock = Pin<'B', 13>;
pub type SpiMiso = Pin<'B', 14>;
pub type SpiMosi = Pin<'B', 15>;

/// 168 MHz from the 8 MHz crystal with the 48 MHz USB clock available, and
/// TIM2 clocked for [`chrono::Chrono`].
pub fn setup_clocks(rcc: pac::RCC) -> Clocks {
    rcc.apb1enr.modify(|_, w| w.tim2en().enabled());
    let rcc = rcc.constrain();
    rcc.cfgr.use_hse(HSE).sysclk(SYSCLK).require_pll48clk().freeze()
}

pub fn spi2(
    spi: pac::SPI2,
    sck: SpiClock,
    miso: SpiMiso,
    mosi: SpiMosi,
    freq: HertzU32,
    clocks: &Clocks,
) -> Spi2 {
    Spi::new(spi, (sck, miso, mosi), MODE_0, freq, clocks)
}

pub fn i2c1(i2c: pac::I2C1, scl: Pin<'B', 8>, sda: Pin<'B', 9>, clocks: &Clocks) -> I2c1 {
    i2c.i2c((scl, sda), I2C1_FREQ, clocks)
}

/// Chip select, idle high.
pub fn chip_select<const P: char, const N: u8>(pin: Pin<P, N>) -> Pin<P, N, Output> {
    pin.into_push_pull_output_in_state(PinState::High)
}
