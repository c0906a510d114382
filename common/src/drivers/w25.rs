//! Winbond W25Q serial NOR flash over plain SPI.

use core::fmt;

use bitfield_struct::bitfield;
use embedded_hal::spi::{Operation, SpiDevice};

use crate::memtest::NorMemory;

pub const PAGE_SIZE: u32 = 256;
pub const SECTOR_SIZE: u32 = 4096;
pub const BLOCK_SIZE: u32 = 65536;

const WINBOND: u8 = 0xEF;

mod command {
    pub const PAGE_PROGRAM: u8 = 0x02;
    pub const READ_DATA: u8 = 0x03;
    pub const READ_STATUS_1: u8 = 0x05;
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const SECTOR_ERASE: u8 = 0x20;
    pub const JEDEC_ID: u8 = 0x9F;
    pub const RELEASE_POWER_DOWN: u8 = 0xAB;
    pub const BLOCK_ERASE: u8 = 0xD8;
}

/// Status register 1.
#[bitfield(u8)]
pub struct Status {
    pub busy: bool,
    pub write_enable_latch: bool,
    #[bits(3)]
    pub block_protect: u8,
    pub top_bottom_protect: bool,
    pub sector_protect: bool,
    pub status_register_protect: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error<E> {
    Spi(E),
    Identity { manufacturer: u8, capacity: u8 },
    OutOfRange { address: u32, length: usize },
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Self::Spi(e)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "spi: {:?}", e),
            Self::Identity { manufacturer, capacity } => {
                write!(f, "unknown part {:#04x}/{:#04x}", manufacturer, capacity)
            }
            Self::OutOfRange { address, length } => {
                write!(f, "{} bytes at {:#x} outside the device", length, address)
            }
        }
    }
}

pub struct W25<SPI> {
    spi: SPI,
    capacity: u32,
}

impl<SPI: SpiDevice> W25<SPI> {
    /// Wakes the device and sizes it from its JEDEC ID.
    pub fn new(mut spi: SPI) -> Result<Self, Error<SPI::Error>> {
        spi.write(&[command::RELEASE_POWER_DOWN])?;
        let mut id = [0u8; 3];
        spi.transaction(&mut [Operation::Write(&[command::JEDEC_ID]), Operation::Read(&mut id)])?;
        let [manufacturer, _memory_type, capacity] = id;
        if manufacturer != WINBOND || !(0x10..=0x20).contains(&capacity) {
            return Err(Error::Identity { manufacturer, capacity });
        }
        let capacity = 1u32 << capacity;
        info!("w25: {=u32} KiB", capacity / 1024);
        Ok(Self { spi, capacity })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn status(&mut self) -> Result<Status, Error<SPI::Error>> {
        let mut status = [0u8];
        self.spi.transaction(&mut [
            Operation::Write(&[command::READ_STATUS_1]),
            Operation::Read(&mut status),
        ])?;
        Ok(Status::from(status[0]))
    }

    fn wait_idle(&mut self) -> Result<(), Error<SPI::Error>> {
        while self.status()?.busy() {}
        Ok(())
    }

    fn check(&self, address: u32, length: usize) -> Result<(), Error<SPI::Error>> {
        let end = u64::from(address) + length as u64;
        if end > u64::from(self.capacity) {
            return Err(Error::OutOfRange { address, length });
        }
        Ok(())
    }

    fn header(command: u8, address: u32) -> [u8; 4] {
        let [_, a2, a1, a0] = address.to_be_bytes();
        [command, a2, a1, a0]
    }

    fn erase(&mut self, command: u8, address: u32) -> Result<(), Error<SPI::Error>> {
        self.check(address, 1)?;
        self.spi.write(&[command::WRITE_ENABLE])?;
        self.spi.write(&Self::header(command, address))?;
        self.wait_idle()
    }

    pub fn erase_sector(&mut self, address: u32) -> Result<(), Error<SPI::Error>> {
        self.erase(command::SECTOR_ERASE, address)
    }

    pub fn erase_block(&mut self, address: u32) -> Result<(), Error<SPI::Error>> {
        self.erase(command::BLOCK_ERASE, address)
    }

    pub fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), Error<SPI::Error>> {
        self.check(address, buffer.len())?;
        let header = Self::header(command::READ_DATA, address);
        self.spi.transaction(&mut [Operation::Write(&header), Operation::Read(buffer)])?;
        Ok(())
    }

    /// Programs `data`, split at page boundaries.
    pub fn program(&mut self, mut address: u32, mut data: &[u8]) -> Result<(), Error<SPI::Error>> {
        self.check(address, data.len())?;
        while !data.is_empty() {
            let room = (PAGE_SIZE - address % PAGE_SIZE) as usize;
            let (page, rest) = data.split_at(room.min(data.len()));
            self.spi.write(&[command::WRITE_ENABLE])?;
            let header = Self::header(command::PAGE_PROGRAM, address);
            self.spi.transaction(&mut [Operation::Write(&header), Operation::Write(page)])?;
            self.wait_idle()?;
            address += page.len() as u32;
            data = rest;
        }
        Ok(())
    }

    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI: SpiDevice> NorMemory for W25<SPI> {
    type Error = Error<SPI::Error>;

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn sector_size(&self) -> u32 {
        SECTOR_SIZE
    }

    fn block_size(&self) -> u32 {
        BLOCK_SIZE
    }

    fn erase_sector(&mut self, address: u32) -> Result<(), Self::Error> {
        W25::erase_sector(self, address)
    }

    fn erase_block(&mut self, address: u32) -> Result<(), Self::Error> {
        W25::erase_block(self, address)
    }

    fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), Self::Error> {
        W25::read(self, address, buffer)
    }

    fn program(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error> {
        W25::program(self, address, data)
    }
}
