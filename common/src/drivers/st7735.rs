//! ST7735 128x160 TFT over 4-wire SPI.

use core::fmt;
use core::iter;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;

pub const WIDTH: u32 = 128;
pub const HEIGHT: u32 = 160;

mod command {
    pub const SWRESET: u8 = 0x01;
    pub const SLPOUT: u8 = 0x11;
    pub const INVOFF: u8 = 0x20;
    pub const DISPON: u8 = 0x29;
    pub const CASET: u8 = 0x2A;
    pub const RASET: u8 = 0x2B;
    pub const RAMWR: u8 = 0x2C;
    pub const MADCTL: u8 = 0x36;
    pub const COLMOD: u8 = 0x3A;
}

const MADCTL_MY: u8 = 0x80;
const MADCTL_MX: u8 = 0x40;
const MADCTL_MV: u8 = 0x20;
const MADCTL_BGR: u8 = 0x08;

/// 16 bits per pixel.
const COLMOD_565: u8 = 0x05;

/// Pixels buffered per SPI write while streaming.
const CHUNK: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Orientation {
    #[default]
    Normal,
    Rotated90,
    Rotated180,
    Rotated270,
}

impl Orientation {
    /// Next orientation, clockwise.
    pub fn next(self) -> Self {
        match self {
            Self::Normal => Self::Rotated90,
            Self::Rotated90 => Self::Rotated180,
            Self::Rotated180 => Self::Rotated270,
            Self::Rotated270 => Self::Normal,
        }
    }

    fn madctl(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Rotated90 => MADCTL_MX | MADCTL_MV,
            Self::Rotated180 => MADCTL_MX | MADCTL_MY,
            Self::Rotated270 => MADCTL_MY | MADCTL_MV,
        }
    }

    pub fn is_landscape(self) -> bool {
        matches!(self, Self::Rotated90 | Self::Rotated270)
    }
}

#[derive(Debug)]
pub enum Error<S, P> {
    Spi(S),
    Pin(P),
}

impl<S: fmt::Debug, P: fmt::Debug> fmt::Display for Error<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "spi: {:?}", e),
            Self::Pin(e) => write!(f, "pin: {:?}", e),
        }
    }
}

/// Panel settings that differ between module vendors.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Panel wired blue-green-red.
    pub bgr: bool,
    /// RAM offset of the visible area, in native (portrait) coordinates.
    pub offset: (u16, u16),
}

impl Default for Config {
    fn default() -> Self {
        Self { bgr: false, offset: (0, 0) }
    }
}

pub struct St7735<SPI, DC, RST> {
    spi: SPI,
    dc: DC,
    rst: RST,
    config: Config,
    orientation: Orientation,
}

impl<SPI, DC, RST, PinError> St7735<SPI, DC, RST>
where
    SPI: SpiDevice,
    DC: OutputPin<Error = PinError>,
    RST: OutputPin<Error = PinError>,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, config: Config) -> Self {
        Self { spi, dc, rst, config, orientation: Orientation::Normal }
    }

    /// Hardware reset followed by the power-up sequence.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<SPI::Error, PinError>> {
        self.rst.set_high().map_err(Error::Pin)?;
        delay.delay_ms(1);
        self.rst.set_low().map_err(Error::Pin)?;
        delay.delay_ms(10);
        self.rst.set_high().map_err(Error::Pin)?;
        delay.delay_ms(120);

        self.command(command::SWRESET, &[])?;
        delay.delay_ms(150);
        self.command(command::SLPOUT, &[])?;
        delay.delay_ms(120);
        self.command(command::COLMOD, &[COLMOD_565])?;
        self.command(command::MADCTL, &[self.madctl()])?;
        self.command(command::INVOFF, &[])?;
        self.command(command::DISPON, &[])?;
        delay.delay_ms(100);
        debug!("st7735 ready");
        Ok(())
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: Orientation) -> Result<(), Error<SPI::Error, PinError>> {
        self.orientation = orientation;
        self.command(command::MADCTL, &[self.madctl()])
    }

    fn madctl(&self) -> u8 {
        self.orientation.madctl() | if self.config.bgr { MADCTL_BGR } else { 0 }
    }

    fn command(&mut self, command: u8, parameters: &[u8]) -> Result<(), Error<SPI::Error, PinError>> {
        self.dc.set_low().map_err(Error::Pin)?;
        self.spi.write(&[command]).map_err(Error::Spi)?;
        if !parameters.is_empty() {
            self.dc.set_high().map_err(Error::Pin)?;
            self.spi.write(parameters).map_err(Error::Spi)?;
        }
        Ok(())
    }

    /// Restricts RAM writes to `area`, which must lie on the panel.
    pub fn set_window(&mut self, area: &Rectangle) -> Result<(), Error<SPI::Error, PinError>> {
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };
        let (dx, dy) = if self.orientation.is_landscape() {
            (self.config.offset.1, self.config.offset.0)
        } else {
            self.config.offset
        };
        let x0 = area.top_left.x as u16 + dx;
        let x1 = bottom_right.x as u16 + dx;
        let y0 = area.top_left.y as u16 + dy;
        let y1 = bottom_right.y as u16 + dy;

        let [x0h, x0l] = x0.to_be_bytes();
        let [x1h, x1l] = x1.to_be_bytes();
        self.command(command::CASET, &[x0h, x0l, x1h, x1l])?;
        let [y0h, y0l] = y0.to_be_bytes();
        let [y1h, y1l] = y1.to_be_bytes();
        self.command(command::RASET, &[y0h, y0l, y1h, y1l])
    }

    /// Streams pixels, MSB first, into the current window.
    pub fn write_pixels<I>(&mut self, pixels: I) -> Result<(), Error<SPI::Error, PinError>>
    where
        I: IntoIterator<Item = Rgb565>,
    {
        self.command(command::RAMWR, &[])?;
        self.dc.set_high().map_err(Error::Pin)?;

        let mut buffer = [0u8; CHUNK * 2];
        let mut filled = 0;
        for color in pixels {
            buffer[filled..filled + 2].copy_from_slice(&color.into_storage().to_be_bytes());
            filled += 2;
            if filled == buffer.len() {
                self.spi.write(&buffer).map_err(Error::Spi)?;
                filled = 0;
            }
        }
        if filled > 0 {
            self.spi.write(&buffer[..filled]).map_err(Error::Spi)?;
        }
        Ok(())
    }

    pub fn release(self) -> (SPI, DC, RST) {
        (self.spi, self.dc, self.rst)
    }
}

impl<SPI, DC, RST> OriginDimensions for St7735<SPI, DC, RST> {
    fn size(&self) -> Size {
        if self.orientation.is_landscape() {
            Size::new(HEIGHT, WIDTH)
        } else {
            Size::new(WIDTH, HEIGHT)
        }
    }
}

impl<SPI, DC, RST, PinError> DrawTarget for St7735<SPI, DC, RST>
where
    SPI: SpiDevice,
    DC: OutputPin<Error = PinError>,
    RST: OutputPin<Error = PinError>,
{
    type Color = Rgb565;
    type Error = Error<SPI::Error, PinError>;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let bounds = self.bounding_box();
        for Pixel(point, color) in pixels {
            if bounds.contains(point) {
                self.set_window(&Rectangle::new(point, Size::new(1, 1)))?;
                self.write_pixels(iter::once(color))?;
            }
        }
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        let visible = area.intersection(&self.bounding_box());
        if visible.is_zero_sized() {
            return Ok(());
        }
        if visible == *area {
            self.set_window(area)?;
            return self.write_pixels(colors.into_iter().take(area.size.width as usize * area.size.height as usize));
        }
        self.draw_iter(
            area.points()
                .zip(colors)
                .filter(|(point, _)| visible.contains(*point))
                .map(|(point, color)| Pixel(point, color)),
        )
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        if area.is_zero_sized() {
            return Ok(());
        }
        self.set_window(&area)?;
        let count = area.size.width as usize * area.size.height as usize;
        self.write_pixels(iter::repeat(color).take(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDelay, MockPin, MockSpi};

    fn display() -> St7735<MockSpi, MockPin, MockPin> {
        St7735::new(MockSpi::default(), MockPin::default(), MockPin::default(), Config::default())
    }

    #[test]
    fn orientation_cycles() {
        let mut orientation = Orientation::default();
        let mut seen = [Orientation::Normal; 4];
        for slot in seen.iter_mut() {
            *slot = orientation;
            orientation = orientation.next();
        }
        assert_eq!(orientation, Orientation::Normal);
        assert_eq!(
            seen,
            [Orientation::Normal, Orientation::Rotated90, Orientation::Rotated180, Orientation::Rotated270]
        );
    }

    #[test]
    fn size_follows_orientation() {
        let mut display = display();
        assert_eq!(display.size(), Size::new(128, 160));
        display.set_orientation(Orientation::Rotated90).unwrap();
        assert_eq!(display.size(), Size::new(160, 128));
        let (spi, _, _) = display.release();
        assert_eq!(spi.transactions, vec![vec![command::MADCTL], vec![MADCTL_MX | MADCTL_MV]]);
    }

    #[test]
    fn init_sequence() {
        let mut display = display();
        let mut delay = MockDelay::default();
        display.init(&mut delay).unwrap();
        assert!(delay.elapsed_ns >= 400_000_000);
        let (spi, _, rst) = display.release();
        assert!(rst.high);
        assert_eq!(rst.toggles, 3);
        let expected: Vec<Vec<u8>> = vec![
            vec![command::SWRESET],
            vec![command::SLPOUT],
            vec![command::COLMOD],
            vec![COLMOD_565],
            vec![command::MADCTL],
            vec![0],
            vec![command::INVOFF],
            vec![command::DISPON],
        ];
        assert_eq!(spi.transactions, expected);
    }

    #[test]
    fn fill_streams_big_endian_pixels() {
        let mut display = display();
        display.fill_solid(&Rectangle::new(Point::new(2, 3), Size::new(2, 1)), Rgb565::RED).unwrap();
        let (spi, _, _) = display.release();
        assert_eq!(
            spi.transactions,
            vec![
                vec![command::CASET],
                vec![0, 2, 0, 3],
                vec![command::RASET],
                vec![0, 3, 0, 3],
                vec![command::RAMWR],
                vec![0xF8, 0x00, 0xF8, 0x00],
            ]
        );
    }

    #[test]
    fn full_screen_fill_is_chunked() {
        let mut display = display();
        display.clear(Rgb565::BLUE).unwrap();
        let (spi, _, _) = display.release();
        let data = &spi.transactions[5..];
        assert_eq!(data.len(), (128 * 160) / CHUNK);
        assert!(data.iter().all(|chunk| chunk.len() == CHUNK * 2));
        assert_eq!(&data[0][..2], &[0x00, 0x1F]);
    }

    #[test]
    fn offset_swaps_in_landscape() {
        let mut display = St7735::new(
            MockSpi::default(),
            MockPin::default(),
            MockPin::default(),
            Config { bgr: true, offset: (2, 1) },
        );
        display.set_orientation(Orientation::Rotated270).unwrap();
        display.set_window(&Rectangle::new(Point::zero(), Size::new(160, 128))).unwrap();
        let (spi, _, _) = display.release();
        assert_eq!(spi.transactions[1], vec![MADCTL_MY | MADCTL_MV | MADCTL_BGR]);
        assert_eq!(spi.transactions[3], vec![0, 1, 0, 160]);
        assert_eq!(spi.transactions[5], vec![0, 2, 0, 129]);
    }

    #[test]
    fn clipped_fill_draws_visible_pixels_only() {
        let mut display = display();
        let area = Rectangle::new(Point::new(127, 159), Size::new(2, 2));
        display.fill_contiguous(&area, iter::repeat(Rgb565::GREEN)).unwrap();
        let (spi, _, _) = display.release();
        // One window plus one single-pixel write.
        assert_eq!(spi.transactions.len(), 6);
        assert_eq!(spi.transactions[5], vec![0x07, 0xE0]);
    }
}
