//! Colour helpers shared by the display programs.

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;

/// Foreground colours cycled through by the `c` console command.
pub const PALETTE: [Rgb888; 7] = [
    Rgb888::new(255, 255, 255),
    Rgb888::new(255, 0, 0),
    Rgb888::new(255, 255, 0),
    Rgb888::new(0, 255, 0),
    Rgb888::new(0, 255, 255),
    Rgb888::new(0, 0, 255),
    Rgb888::new(255, 0, 255),
];

pub fn palette(index: u32) -> Rgb888 {
    PALETTE[index as usize % PALETTE.len()]
}

/// Linear blend from `a` (at `current == 0`) towards `b` (at `current == total`).
pub fn interpolate(a: Rgb888, b: Rgb888, current: i32, total: i32) -> Rgb888 {
    if total == 0 {
        return a;
    }
    let channel = |from: u8, to: u8| {
        let from = i32::from(from);
        (from + (i32::from(to) - from) * current / total).clamp(0, 255) as u8
    };
    Rgb888::new(channel(a.r(), b.r()), channel(a.g(), b.g()), channel(a.b(), b.b()))
}

/// Truncates to 5/6/5 bits and packs as `rrrrrggg gggbbbbb`.
pub fn rgb_to_565(color: Rgb888) -> u16 {
    to_rgb565(color).into_storage()
}

pub fn to_rgb565(color: Rgb888) -> Rgb565 {
    Rgb565::new(color.r() >> 3, color.g() >> 2, color.b() >> 3)
}

/// Places the 565 channels in the top bits of an 8-bit triple.
pub fn expand_565(color: Rgb565) -> Rgb888 {
    Rgb888::new(color.r() << 3, color.g() << 2, color.b() << 3)
}
