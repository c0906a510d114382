//! Bus doubles for driver tests.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::i2c::{self, I2c};
use embedded_hal::spi::{self, Operation, SpiDevice};

/// Records every transaction's outgoing bytes and answers reads from a queue
/// of canned responses (zeros once the queue runs dry).
#[derive(Default)]
pub struct MockSpi {
    pub transactions: Vec<Vec<u8>>,
    pub responses: VecDeque<Vec<u8>>,
}

impl MockSpi {
    pub fn respond(&mut self, bytes: &[u8]) {
        self.responses.push_back(bytes.to_vec());
    }

    fn answer(&mut self, buffer: &mut [u8]) {
        let response = self.responses.pop_front().unwrap_or_default();
        for (index, byte) in buffer.iter_mut().enumerate() {
            *byte = response.get(index).copied().unwrap_or(0);
        }
    }
}

impl spi::ErrorType for MockSpi {
    type Error = Infallible;
}

impl SpiDevice for MockSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        let mut record = Vec::new();
        for operation in operations {
            match operation {
                Operation::Write(data) => record.extend_from_slice(data),
                Operation::Read(buffer) => self.answer(buffer),
                Operation::Transfer(read, write) => {
                    record.extend_from_slice(write);
                    self.answer(read);
                }
                Operation::TransferInPlace(buffer) => {
                    record.extend_from_slice(buffer);
                    self.answer(buffer);
                }
                Operation::DelayNs(_) => {}
            }
        }
        self.transactions.push(record);
        Ok(())
    }
}

/// A 256-register I2C device with an auto-incrementing register pointer.
pub struct MockI2c {
    pub address: u8,
    pub registers: [u8; 256],
    pub writes: Vec<(u8, u8)>,
}

impl MockI2c {
    pub fn new(address: u8) -> Self {
        Self { address, registers: [0; 256], writes: Vec::new() }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Nack;

impl i2c::Error for Nack {
    fn kind(&self) -> i2c::ErrorKind {
        i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Address)
    }
}

impl i2c::ErrorType for MockI2c {
    type Error = Nack;
}

impl I2c for MockI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(Nack);
        }
        let mut pointer = 0usize;
        for operation in operations {
            match operation {
                i2c::Operation::Write(data) => {
                    if let Some((first, rest)) = data.split_first() {
                        pointer = usize::from(*first);
                        for value in rest {
                            self.registers[pointer % 256] = *value;
                            self.writes.push(((pointer % 256) as u8, *value));
                            pointer += 1;
                        }
                    }
                }
                i2c::Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        *byte = self.registers[pointer % 256];
                        pointer += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockPin {
    pub high: bool,
    pub toggles: usize,
}

impl digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.toggles += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.toggles += 1;
        Ok(())
    }
}

/// Accumulates the requested delay instead of sleeping.
#[derive(Default)]
pub struct MockDelay {
    pub elapsed_ns: u64,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}
