use bringup_common::drivers::st7735::{Config, St7735};
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use hal::gpio::{Output, Pin};
use hal::spi::Spi2;

use super::hal;

pub type DisplayCs = Pin<'B', 12, Output>;
pub type DisplayDc = Pin<'B', 11, Output>;
pub type DisplayRst = Pin<'B', 10, Output>;
pub type DisplaySpi = ExclusiveDevice<Spi2, DisplayCs, NoDelay>;
pub type Tft = St7735<DisplaySpi, DisplayDc, DisplayRst>;

/// The 1.8" module on the board is wired RGB with no RAM offset.
pub const TFT_CONFIG: Config = Config { bgr: false, offset: (0, 0) };

pub fn tft(spi: Spi2, cs: DisplayCs, dc: DisplayDc, rst: DisplayRst) -> Tft {
    St7735::new(ExclusiveDevice::new(spi, cs, NoDelay), dc, rst, TFT_CONFIG)
}
