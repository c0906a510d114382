//! # bringup-common
//!
//! Hardware-independent pieces shared by the `bringup` example programs.
//!
//! | Module | Purpose |
//! | ------ | ------- |
//! | [`fixed`] | `i<N>q<M>` fixed-point descriptors and decimal formatting |
//! | [`color`] | Palette, interpolation and 565 packing |
//! | [`pattern`] | Display test patterns as `embedded-graphics` drawables |
//! | [`console`] | Serial console command handling |
//! | [`drivers`] | `embedded-hal` device drivers (TFT, IMU, touch, 1-Wire, NOR flash) |
//! | [`memtest`] | Erase/program/verify sequence for NOR memories |
//! | [`boot`] | Bootloader helpers: flash layout, vector table checks |
//! | [`debounce`] | Input debouncing |
//!
//! Everything here builds for the host, so `cargo test` at the workspace root
//! exercises it without a board attached.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod boot;
pub mod color;
pub mod console;
pub mod debounce;
pub mod drivers;
pub mod fixed;
pub mod memtest;
pub mod pattern;

#[cfg(test)]
pub(crate) mod testing;
