//! XPT2046 / ADS7843 resistive touch controller.

use embedded_hal::spi::SpiDevice;

/// 12-bit differential conversions, power down between conversions.
mod channel {
    pub const X: u8 = 0xD0;
    pub const Y: u8 = 0x90;
    pub const Z1: u8 = 0xB0;
    pub const Z2: u8 = 0xC0;
}

const FULL_SCALE: u16 = 0x0FFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    pub x: (u16, u16),
    pub y: (u16, u16),
}

impl Default for Calibration {
    fn default() -> Self {
        Self { x: (0, FULL_SCALE), y: (0, FULL_SCALE) }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub width: u16,
    pub height: u16,
    /// Minimum pressure reported as a touch.
    pub threshold: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self { width: 240, height: 320, threshold: 100 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Touch {
    pub x: i16,
    pub y: i16,
    pub pressure: i16,
}

impl Touch {
    pub fn to_array(self) -> [i16; 3] {
        [self.x, self.y, self.pressure]
    }
}

pub struct Xpt2046<SPI> {
    spi: SPI,
    config: Config,
    calibration: Calibration,
}

impl<SPI: SpiDevice> Xpt2046<SPI> {
    pub fn new(spi: SPI, config: Config) -> Self {
        Self { spi, config, calibration: Calibration::default() }
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    /// Maps the full converter range onto the screen.
    pub fn reset_calibration(&mut self) {
        self.calibration = Calibration::default();
    }

    fn convert(&mut self, command: u8) -> Result<u16, SPI::Error> {
        let mut frame = [command, 0, 0];
        self.spi.transfer_in_place(&mut frame)?;
        Ok((u16::from_be_bytes([frame[1], frame[2]]) >> 3) & FULL_SCALE)
    }

    /// Raw `(x, y, pressure)` conversions.
    pub fn read_raw(&mut self) -> Result<(u16, u16, u16), SPI::Error> {
        let z1 = self.convert(channel::Z1)?;
        let z2 = self.convert(channel::Z2)?;
        let x = self.convert(channel::X)?;
        let y = self.convert(channel::Y)?;
        Ok((x, y, (z1 + FULL_SCALE).saturating_sub(z2)))
    }

    /// A calibrated touch, or `None` when the panel is not pressed hard enough.
    pub fn sample(&mut self) -> Result<Option<Touch>, SPI::Error> {
        let (x, y, pressure) = self.read_raw()?;
        if pressure < self.config.threshold {
            return Ok(None);
        }
        Ok(Some(Touch {
            x: scale(x, self.calibration.x, self.config.width),
            y: scale(y, self.calibration.y, self.config.height),
            pressure: pressure.min(i16::MAX as u16) as i16,
        }))
    }
}

fn scale(raw: u16, (min, max): (u16, u16), extent: u16) -> i16 {
    if max <= min || extent == 0 {
        return 0;
    }
    let raw = u32::from(raw.clamp(min, max) - min);
    let span = u32::from(max - min);
    (raw * u32::from(extent - 1) / span) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSpi;

    /// Frame whose reply carries `value` in bits 14..3.
    fn reply(value: u16) -> [u8; 3] {
        let [high, low] = (value << 3).to_be_bytes();
        [0, high, low]
    }

    fn touch(spi: &mut MockSpi, x: u16, y: u16, z1: u16, z2: u16) {
        for value in [z1, z2, x, y] {
            spi.respond(&reply(value));
        }
    }

    #[test]
    fn reads_channels_in_order() {
        let mut touch_panel = Xpt2046::new(MockSpi::default(), Config::default());
        touch_panel.read_raw().unwrap();
        let commands: Vec<u8> = touch_panel.spi.transactions.iter().map(|t| t[0]).collect();
        assert_eq!(commands, vec![0xB0, 0xC0, 0xD0, 0x90]);
    }

    #[test]
    fn maps_full_range_to_resolution() {
        let mut spi = MockSpi::default();
        touch(&mut spi, 4095, 0, 2000, 2000);
        let mut panel = Xpt2046::new(spi, Config::default());
        let sample = panel.sample().unwrap().unwrap();
        assert_eq!(sample, Touch { x: 239, y: 0, pressure: 4095 });
        assert_eq!(sample.to_array(), [239, 0, 4095]);
    }

    #[test]
    fn light_touch_is_ignored() {
        let mut spi = MockSpi::default();
        touch(&mut spi, 2048, 2048, 0, 4090);
        let mut panel = Xpt2046::new(spi, Config::default());
        assert_eq!(panel.sample().unwrap(), None);
    }

    #[test]
    fn calibration_clamps() {
        let mut spi = MockSpi::default();
        touch(&mut spi, 100, 3900, 1000, 500);
        let mut panel = Xpt2046::new(spi, Config::default());
        panel.set_calibration(Calibration { x: (200, 3800), y: (200, 3800) });
        let sample = panel.sample().unwrap().unwrap();
        assert_eq!((sample.x, sample.y), (0, 319));

        panel.reset_calibration();
        assert_eq!(panel.calibration(), Calibration::default());
    }

    #[test]
    fn scale_midpoint() {
        assert_eq!(scale(2048, (0, 4095), 240), 119);
        assert_eq!(scale(10, (5, 5), 240), 0);
    }
}
