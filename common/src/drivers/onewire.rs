//! Bit-banged 1-Wire bus master.
//!
//! [`BitBus`] is the seam between the protocol (ROM search, byte I/O, CRC) and
//! the timing-critical slot generation in [`OneWirePin`].

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

pub const SEARCH_ROM: u8 = 0xF0;
pub const MATCH_ROM: u8 = 0x55;
pub const SKIP_ROM: u8 = 0xCC;

#[derive(Debug, PartialEq, Eq)]
pub enum Error<E> {
    Bus(E),
    /// Nobody answered the reset pulse.
    NoPresence,
    Crc,
    UnexpectedFamily(u8),
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Self::Bus(e)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {:?}", e),
            Self::NoPresence => f.write_str("no presence pulse"),
            Self::Crc => f.write_str("crc mismatch"),
            Self::UnexpectedFamily(family) => write!(f, "unexpected family code {:#04x}", family),
        }
    }
}

/// Slot-level access to a 1-Wire bus. Bytes travel LSB first.
pub trait BitBus {
    type Error;

    /// Reset pulse; `true` when at least one device answered.
    fn reset(&mut self) -> Result<bool, Self::Error>;
    fn write_bit(&mut self, bit: bool) -> Result<(), Self::Error>;
    fn read_bit(&mut self) -> Result<bool, Self::Error>;

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        for bit in 0..8 {
            self.write_bit(byte & (1 << bit) != 0)?;
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut byte = 0;
        for bit in 0..8 {
            if self.read_bit()? {
                byte |= 1 << bit;
            }
        }
        Ok(byte)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        bytes.iter().try_for_each(|byte| self.write_byte(*byte))
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        for byte in buffer.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(())
    }
}

/// Standard-speed master on an open-drain pin with an external pull-up.
///
/// Slots are timed with busy waits; run it where a few tens of microseconds
/// of latency are acceptable, or with interrupts masked.
pub struct OneWirePin<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> OneWirePin<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(mut pin: P, delay: D) -> Result<Self, P::Error> {
        pin.set_high()?;
        Ok(Self { pin, delay })
    }

    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }
}

impl<P, D> BitBus for OneWirePin<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    type Error = P::Error;

    fn reset(&mut self) -> Result<bool, Self::Error> {
        self.pin.set_low()?;
        self.delay.delay_us(480);
        self.pin.set_high()?;
        self.delay.delay_us(70);
        let presence = self.pin.is_low()?;
        self.delay.delay_us(410);
        Ok(presence)
    }

    fn write_bit(&mut self, bit: bool) -> Result<(), Self::Error> {
        let (low, high) = if bit { (6, 64) } else { (60, 10) };
        self.pin.set_low()?;
        self.delay.delay_us(low);
        self.pin.set_high()?;
        self.delay.delay_us(high);
        Ok(())
    }

    fn read_bit(&mut self) -> Result<bool, Self::Error> {
        self.pin.set_low()?;
        self.delay.delay_us(6);
        self.pin.set_high()?;
        self.delay.delay_us(9);
        let bit = self.pin.is_high()?;
        self.delay.delay_us(55);
        Ok(bit)
    }
}

/// Dallas/Maxim CRC-8 (x^8 + x^5 + x^4 + 1, reflected). A block followed by
/// its CRC sums to zero.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, |mut crc, byte| {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
        crc
    })
}

/// 64-bit ROM code: family code in the low byte, CRC in the high byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rom(pub u64);

impl Rom {
    pub fn family(&self) -> u8 {
        self.0 as u8
    }

    /// Bytes in bus order.
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

/// Dotted hex, CRC byte first.
impl fmt::Display for Rom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.0.to_be_bytes().iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Addresses one device for the next function command.
pub fn select<B: BitBus>(bus: &mut B, rom: &Rom) -> Result<(), Error<B::Error>> {
    if !bus.reset()? {
        return Err(Error::NoPresence);
    }
    bus.write_byte(MATCH_ROM)?;
    bus.write_bytes(&rom.to_bytes())?;
    Ok(())
}

/// Addresses every device at once.
pub fn skip<B: BitBus>(bus: &mut B) -> Result<(), Error<B::Error>> {
    if !bus.reset()? {
        return Err(Error::NoPresence);
    }
    bus.write_byte(SKIP_ROM)?;
    Ok(())
}

/// ROM search state (Maxim application note 187).
#[derive(Debug, Default)]
pub struct Search {
    rom: [u8; 8],
    last_discrepancy: u8,
    done: bool,
}

impl Search {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next ROM on the bus, `None` once every device has been reported.
    pub fn next<B: BitBus>(&mut self, bus: &mut B) -> Result<Option<Rom>, Error<B::Error>> {
        if self.done {
            return Ok(None);
        }
        if !bus.reset()? {
            *self = Self::default();
            return Err(Error::NoPresence);
        }
        bus.write_byte(SEARCH_ROM)?;

        let mut last_zero = 0;
        for bit in 1..=64u8 {
            let index = usize::from((bit - 1) / 8);
            let mask = 1 << ((bit - 1) % 8);

            let id = bus.read_bit()?;
            let complement = bus.read_bit()?;
            let direction = match (id, complement) {
                (true, true) => {
                    // Devices dropped out mid-search.
                    *self = Self { done: true, ..Self::default() };
                    return Ok(None);
                }
                (id, complement) if id != complement => id,
                _ => {
                    let direction = if bit < self.last_discrepancy {
                        self.rom[index] & mask != 0
                    } else {
                        bit == self.last_discrepancy
                    };
                    if !direction {
                        last_zero = bit;
                    }
                    direction
                }
            };

            if direction {
                self.rom[index] |= mask;
            } else {
                self.rom[index] &= !mask;
            }
            bus.write_bit(direction)?;
        }

        self.last_discrepancy = last_zero;
        self.done = last_zero == 0;

        if crc8(&self.rom) != 0 {
            return Err(Error::Crc);
        }
        let rom = Rom(u64::from_le_bytes(self.rom));
        trace!("1-wire: found {=u64:#x}", rom.0);
        Ok(Some(rom))
    }
}

#[cfg(test)]
pub(crate) mod sim {
    //! Wired-AND bus with a set of simulated devices, enough for ROM search
    //! and scripted function commands.

    use super::*;
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::vec::Vec;

    pub fn rom(family: u8, serial: u64) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0] = family;
        bytes[1..7].copy_from_slice(&serial.to_le_bytes()[..6]);
        bytes[7] = crc8(&bytes[..7]);
        bytes
    }

    enum Phase {
        Command { bits: u8, value: u8 },
        Search { bit: usize, step: u8 },
        Function,
    }

    pub struct SimBus {
        pub devices: Vec<[u8; 8]>,
        active: Vec<bool>,
        phase: Phase,
        /// Every byte written outside the search phase.
        pub written: Vec<u8>,
        pending: (u8, u8),
        /// Bytes answered to reads outside the search phase.
        pub replies: VecDeque<u8>,
        reply_bit: u8,
    }

    impl SimBus {
        pub fn new(devices: Vec<[u8; 8]>) -> Self {
            let active = vec![true; devices.len()];
            Self {
                devices,
                active,
                phase: Phase::Function,
                written: Vec::new(),
                pending: (0, 0),
                replies: VecDeque::new(),
                reply_bit: 0,
            }
        }

        fn bit(rom: &[u8; 8], bit: usize) -> bool {
            rom[bit / 8] & (1 << (bit % 8)) != 0
        }

        fn wired_and(&self, bit: usize, complement: bool) -> bool {
            self.devices
                .iter()
                .zip(&self.active)
                .filter(|(_, active)| **active)
                .all(|(rom, _)| Self::bit(rom, bit) != complement)
        }
    }

    impl BitBus for SimBus {
        type Error = Infallible;

        fn reset(&mut self) -> Result<bool, Infallible> {
            self.active.iter_mut().for_each(|a| *a = true);
            self.phase = Phase::Command { bits: 0, value: 0 };
            Ok(!self.devices.is_empty())
        }

        fn write_bit(&mut self, bit: bool) -> Result<(), Infallible> {
            match &mut self.phase {
                Phase::Command { bits, value } => {
                    *value |= u8::from(bit) << *bits;
                    *bits += 1;
                    if *bits == 8 {
                        let command = *value;
                        self.phase = if command == SEARCH_ROM {
                            Phase::Search { bit: 0, step: 0 }
                        } else {
                            self.written.push(command);
                            Phase::Function
                        };
                    }
                }
                Phase::Search { bit: index, step } => {
                    let index_now = *index;
                    *index += 1;
                    *step = 0;
                    for (rom, active) in self.devices.iter().zip(self.active.iter_mut()) {
                        if Self::bit(rom, index_now) != bit {
                            *active = false;
                        }
                    }
                }
                Phase::Function => {
                    let (bits, value) = &mut self.pending;
                    *value |= u8::from(bit) << *bits;
                    *bits += 1;
                    if *bits == 8 {
                        self.written.push(*value);
                        self.pending = (0, 0);
                    }
                }
            }
            Ok(())
        }

        fn read_bit(&mut self) -> Result<bool, Infallible> {
            match self.phase {
                Phase::Search { bit, step } => {
                    let value = self.wired_and(bit, step == 1);
                    self.phase = Phase::Search { bit, step: step + 1 };
                    Ok(value)
                }
                _ => {
                    let byte = self.replies.front().copied().unwrap_or(0xFF);
                    let value = byte & (1 << self.reply_bit) != 0;
                    self.reply_bit += 1;
                    if self.reply_bit == 8 {
                        self.reply_bit = 0;
                        self.replies.pop_front();
                    }
                    Ok(value)
                }
            }
        }
    }
}
