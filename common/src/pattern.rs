//! Full-screen test patterns.
//!
//! Every pattern is a pure function of the pixel position and the target
//! size, so a [`TestPattern`] can be streamed into any
//! [`DrawTarget`] with a single `fill_contiguous` call.

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;

use crate::color::{interpolate, palette, to_rgb565};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Page {
    Solid,
    Gradient,
    Lines,
    Chess,
    Marker,
}

impl Page {
    pub const ALL: [Page; 5] = [Page::Solid, Page::Gradient, Page::Lines, Page::Chess, Page::Marker];

    /// Page for the console digit `1`..`5`, zero based.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }
}

/// A page together with its colour and style indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestPattern {
    pub page: Page,
    pub color: u32,
    pub style: u32,
}

impl TestPattern {
    pub const fn new(page: Page, color: u32, style: u32) -> Self {
        Self { page, color, style }
    }

    fn foreground(&self) -> Rgb888 {
        palette(self.color)
    }

    /// `(A, B)` for the two-colour pages; style odd swaps them.
    fn pair(&self, foreground_first: bool) -> (Rgb565, Rgb565) {
        let fg = to_rgb565(self.foreground());
        if (self.style & 1 == 1) == foreground_first {
            (fg, Rgb565::BLACK)
        } else {
            (Rgb565::BLACK, fg)
        }
    }

    fn solid(&self) -> Rgb565 {
        if self.color % 8 == 0 {
            Rgb565::BLACK
        } else {
            to_rgb565(self.foreground())
        }
    }

    /// Colour of pixel `point` on a target of `size`.
    pub fn pixel(&self, point: Point, size: Size) -> Rgb565 {
        let x = point.x.max(0) as u32;
        let y = point.y.max(0) as u32;
        match self.page {
            Page::Solid => self.solid(),
            Page::Gradient => {
                let (from, to) = if self.style & 1 == 1 {
                    (self.foreground(), Rgb888::BLACK)
                } else {
                    (Rgb888::BLACK, self.foreground())
                };
                to_rgb565(interpolate(from, to, y as i32, size.height as i32))
            }
            Page::Lines => {
                let (a, b) = (to_rgb565(self.foreground()), Rgb565::BLACK);
                let on = match self.style % 3 {
                    1 => (y * size.width + x) & 1 == 1,
                    2 => y & 1 == 1,
                    _ => (x & 1 == 1) == (y & 1 == 1),
                };
                if on {
                    a
                } else {
                    b
                }
            }
            Page::Chess => {
                let (a, b) = self.pair(true);
                let div = (size.width / 8).max(1);
                if (x / div + y / div) & 1 == 0 {
                    a
                } else {
                    b
                }
            }
            Page::Marker => {
                // An upright "F" on a 5x7 grid, so mirroring and rotation are
                // visible at a glance.
                let (a, b) = self.pair(false);
                let column = x / (size.width / 5).max(1);
                let row = y / (size.height / 7).max(1);
                match row {
                    1 | 3 if column != 0 && column != 4 => a,
                    2 | 4 | 5 if column == 1 => a,
                    _ => b,
                }
            }
        }
    }

    /// All pixels of a `size` target in row-major order.
    pub fn pixels(&self, size: Size) -> impl Iterator<Item = Rgb565> + '_ {
        (0..size.height as i32).flat_map(move |y| {
            (0..size.width as i32).map(move |x| self.pixel(Point::new(x, y), size))
        })
    }
}

impl Drawable for TestPattern {
    type Color = Rgb565;
    type Output = ();

    fn draw<D>(&self, target: &mut D) -> Result<Self::Output, D::Error>
    where
        D: DrawTarget<Color = Self::Color>,
    {
        let area = target.bounding_box();
        match self.page {
            Page::Solid => target.fill_solid(&area, self.solid()),
            _ => target.fill_contiguous(&area, self.pixels(area.size)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::mock_display::MockDisplay;

    fn render(pattern: TestPattern) -> MockDisplay<Rgb565> {
        let mut display = MockDisplay::new();
        pattern.draw(&mut display).unwrap();
        display
    }

    fn at(display: &MockDisplay<Rgb565>, x: i32, y: i32) -> Rgb565 {
        display.get_pixel(Point::new(x, y)).unwrap()
    }

    #[test]
    fn page_indices() {
        assert_eq!(Page::from_index(0), Some(Page::Solid));
        assert_eq!(Page::from_index(4), Some(Page::Marker));
        assert_eq!(Page::from_index(5), None);
    }

    #[test]
    fn solid_fills_every_pixel() {
        let display = render(TestPattern::new(Page::Solid, 1, 0));
        for point in display.bounding_box().points() {
            assert_eq!(display.get_pixel(point), Some(Rgb565::RED));
        }
    }

    #[test]
    fn solid_black_every_eighth_colour() {
        assert_eq!(at(&render(TestPattern::new(Page::Solid, 0, 0)), 3, 3), Rgb565::BLACK);
        assert_eq!(at(&render(TestPattern::new(Page::Solid, 8, 0)), 3, 3), Rgb565::BLACK);
        assert_eq!(at(&render(TestPattern::new(Page::Solid, 7, 0)), 3, 3), Rgb565::WHITE);
    }

    #[test]
    fn gradient_direction_follows_style() {
        let rising = render(TestPattern::new(Page::Gradient, 1, 0));
        assert_eq!(at(&rising, 10, 0), Rgb565::BLACK);
        // 255 * 63 / 64 = 251, truncated to 5 bits.
        assert_eq!(at(&rising, 10, 63), Rgb565::new(31, 0, 0));
        assert_eq!(at(&rising, 0, 32), at(&rising, 63, 32));

        let falling = render(TestPattern::new(Page::Gradient, 1, 1));
        assert_eq!(at(&falling, 10, 0), Rgb565::RED);
        assert_eq!(at(&falling, 10, 63), Rgb565::new(0, 0, 0));
    }

    #[test]
    fn lines_styles() {
        let fg = Rgb565::WHITE;
        let bg = Rgb565::BLACK;

        let pixels = render(TestPattern::new(Page::Lines, 0, 1));
        assert_eq!([at(&pixels, 0, 0), at(&pixels, 1, 0), at(&pixels, 0, 1)], [bg, fg, bg]);

        let rows = render(TestPattern::new(Page::Lines, 0, 2));
        assert_eq!([at(&rows, 0, 0), at(&rows, 5, 0), at(&rows, 0, 1), at(&rows, 5, 1)], [bg, bg, fg, fg]);

        let checker = render(TestPattern::new(Page::Lines, 0, 3));
        assert_eq!(
            [at(&checker, 0, 0), at(&checker, 1, 0), at(&checker, 0, 1), at(&checker, 1, 1)],
            [fg, bg, bg, fg]
        );
    }

    #[test]
    fn lines_parity_uses_linear_index() {
        let pattern = TestPattern::new(Page::Lines, 0, 1);
        let size = Size::new(5, 3);
        // Odd width: row 1 starts on an odd index.
        assert_eq!(pattern.pixel(Point::new(0, 1), size), Rgb565::WHITE);
        assert_eq!(pattern.pixel(Point::new(0, 2), size), Rgb565::BLACK);
    }

    #[test]
    fn chess_cells() {
        let even = render(TestPattern::new(Page::Chess, 5, 0));
        assert_eq!(at(&even, 0, 0), Rgb565::BLACK);
        assert_eq!(at(&even, 7, 7), Rgb565::BLACK);
        assert_eq!(at(&even, 8, 0), Rgb565::BLUE);
        assert_eq!(at(&even, 0, 8), Rgb565::BLUE);
        assert_eq!(at(&even, 8, 8), Rgb565::BLACK);

        let odd = render(TestPattern::new(Page::Chess, 5, 1));
        assert_eq!(at(&odd, 0, 0), Rgb565::BLUE);
        assert_eq!(at(&odd, 8, 0), Rgb565::BLACK);
    }

    #[test]
    fn small_targets_use_unit_cells() {
        let pattern = TestPattern::new(Page::Chess, 0, 0);
        let size = Size::new(4, 4);
        assert_eq!(pattern.pixel(Point::new(0, 0), size), Rgb565::BLACK);
        assert_eq!(pattern.pixel(Point::new(1, 0), size), Rgb565::WHITE);

        let marker = TestPattern::new(Page::Marker, 0, 0);
        assert_eq!(marker.pixel(Point::new(1, 2), Size::new(3, 3)), Rgb565::WHITE);
    }

    #[test]
    fn marker_glyph() {
        // 64x64: columns 12 wide, rows 9 high.
        let display = render(TestPattern::new(Page::Marker, 3, 0));
        let (a, b) = (Rgb565::GREEN, Rgb565::BLACK);
        assert_eq!(at(&display, 20, 0), b);
        assert_eq!(at(&display, 0, 10), b);
        assert_eq!(at(&display, 20, 10), a);
        assert_eq!(at(&display, 40, 30), a);
        assert_eq!(at(&display, 50, 10), b);
        assert_eq!(at(&display, 13, 20), a);
        assert_eq!(at(&display, 30, 20), b);
        assert_eq!(at(&display, 13, 50), a);
        assert_eq!(at(&display, 13, 60), b);

        let inverted = render(TestPattern::new(Page::Marker, 3, 1));
        assert_eq!(at(&inverted, 20, 0), a);
        assert_eq!(at(&inverted, 20, 10), b);
    }

    #[test]
    fn pixel_stream_covers_target() {
        let size = Size::new(7, 5);
        for page in Page::ALL {
            assert_eq!(TestPattern::new(page, 1, 0).pixels(size).count(), 35);
        }
    }
}
