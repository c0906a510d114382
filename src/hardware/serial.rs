//! Console on USART2.
//!
//! Output is blocking and uses `\r\n` line endings. Received bytes are read
//! from the RXNE interrupt with [`drain`].

use core::fmt;

use bringup_common::fixed::{self, DataFormat, FormatOptions, Sample};
use embedded_hal_nb::serial::{Read, Write};
use hal::gpio::Pin;
use hal::pac::USART2;
use hal::prelude::*;
use hal::rcc::Clocks;
use hal::serial::{config::Config, Event, Rx, Serial, Tx};
use nb::block;

use super::hal;

pub type ConsoleRx = Rx<USART2>;

pub struct Console<TX> {
    tx: TX,
}

impl<TX: Write<u8>> Console<TX> {
    pub fn new(tx: TX) -> Self {
        Self { tx }
    }

    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        let _ = block!(self.tx.write(b));
    }

    pub fn write_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.write_byte(b);
        }
    }

    /// Writes `s` and the line terminator.
    pub fn println(&mut self, s: &str) {
        self.write_str(s);
        self.write_str("\r\n");
    }

    /// Samples as fixed-point text, see [`fixed::write_values`].
    pub fn write_values<T: Sample>(&mut self, values: &[T], format: &DataFormat, options: FormatOptions) {
        if let Err(e) = fixed::write_values(self, values, format, options) {
            defmt::warn!("console: {}", e);
        }
    }
}

impl<TX: Write<u8>> fmt::Write for Console<TX> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Console::write_str(self, s);
        Ok(())
    }
}

/// USART2 at `baud`, 8N1, with the receive interrupt enabled.
pub fn usart2(
    usart: USART2,
    tx: Pin<'A', 2>,
    rx: Pin<'A', 3>,
    baud: u32,
    clocks: &Clocks,
) -> (Console<Tx<USART2>>, ConsoleRx) {
    let mut serial: Serial<USART2> = match Serial::new(usart, (tx, rx), Config::default().baudrate(baud.bps()), clocks) {
        Ok(serial) => serial,
        Err(_) => defmt::panic!("usart2: invalid configuration for {=u32} bps", baud),
    };
    serial.listen(Event::RxNotEmpty);
    let (tx, rx) = serial.split();
    (Console::new(tx), rx)
}

/// Hands every byte waiting in the receiver to `f`. Overrun and framing
/// errors drop the byte.
pub fn drain<RX: Read<u8>>(rx: &mut RX, mut f: impl FnMut(u8)) {
    loop {
        match rx.read() {
            Ok(byte) => f(byte),
            Err(nb::Error::WouldBlock) => break,
            Err(nb::Error::Other(_)) => defmt::warn!("usart: receive error"),
        }
    }
}
