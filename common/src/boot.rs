//! Bootloader helpers: internal flash geometry, the application vector table
//! check and the DFU request test.

use core::fmt;

/// Value left in retained RAM by an application that wants the bootloader to
/// stay in DFU mode after the next reset.
pub const DFU_MAGIC: u32 = 0x3A84_508F;

/// DFU mode is entered when the retained word holds [`DFU_MAGIC`] or the boot
/// button is held.
pub fn boot_requested(magic: u32, button: bool) -> bool {
    magic == DFU_MAGIC || button
}

/// `count` consecutive sectors of `size` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashRegion {
    pub count: u16,
    pub size: u32,
    pub erase_time_ms: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sector {
    pub number: u16,
    pub address: u32,
    pub size: u32,
    pub erase_time_ms: u32,
}

impl Sector {
    pub fn end(&self) -> u32 {
        self.address + self.size
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// Firmware offset is not on a sector boundary.
    Unaligned,
    /// Address outside the flash array.
    OutOfRange,
    /// Address inside the bootloader area.
    Protected,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unaligned => "firmware offset not sector aligned",
            Self::OutOfRange => "address outside flash",
            Self::Protected => "address inside bootloader",
        })
    }
}

/// Flash array starting at `base`, with the firmware image at `base + offset`.
#[derive(Clone, Copy, Debug)]
pub struct FirmwareLayout<'a> {
    base: u32,
    regions: &'a [FlashRegion],
    offset: u32,
}

impl<'a> FirmwareLayout<'a> {
    pub fn new(base: u32, regions: &'a [FlashRegion], offset: u32) -> Result<Self, LayoutError> {
        let layout = Self { base, regions, offset };
        if offset >= layout.capacity() {
            return Err(LayoutError::OutOfRange);
        }
        if !layout.sectors().any(|sector| sector.address == base + offset) {
            return Err(LayoutError::Unaligned);
        }
        Ok(layout)
    }

    pub fn capacity(&self) -> u32 {
        self.regions.iter().map(|r| u32::from(r.count) * r.size).sum()
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn firmware_start(&self) -> u32 {
        self.base + self.offset
    }

    /// One past the last flash byte.
    pub fn firmware_end(&self) -> u32 {
        self.base + self.capacity()
    }

    pub fn sectors(&self) -> impl Iterator<Item = Sector> + 'a {
        let base = self.base;
        self.regions
            .iter()
            .flat_map(|region| (0..region.count).map(move |_| *region))
            .scan((0u16, base), |(number, address), region| {
                let sector = Sector {
                    number: *number,
                    address: *address,
                    size: region.size,
                    erase_time_ms: region.erase_time_ms,
                };
                *number += 1;
                *address += region.size;
                Some(sector)
            })
    }

    /// Sectors the bootloader may erase.
    pub fn firmware_sectors(&self) -> impl Iterator<Item = Sector> + 'a {
        let start = self.firmware_start();
        self.sectors().filter(move |sector| sector.address >= start)
    }

    pub fn contains(&self, address: u32) -> bool {
        (self.firmware_start()..self.firmware_end()).contains(&address)
    }

    /// Sector containing `address`, which must lie in the firmware area.
    pub fn sector(&self, address: u32) -> Result<Sector, LayoutError> {
        if !(self.base..self.firmware_end()).contains(&address) {
            return Err(LayoutError::OutOfRange);
        }
        if address < self.firmware_start() {
            return Err(LayoutError::Protected);
        }
        self.sectors()
            .find(|sector| (sector.address..sector.end()).contains(&address))
            .ok_or(LayoutError::OutOfRange)
    }

    /// Checks that `length` bytes at `address` lie in the firmware area.
    pub fn check_range(&self, address: u32, length: usize) -> Result<(), LayoutError> {
        self.sector(address)?;
        let end = u64::from(address) + length as u64;
        if end > u64::from(self.firmware_end()) {
            return Err(LayoutError::OutOfRange);
        }
        Ok(())
    }
}

/// Inclusive address window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RamWindow {
    pub start: u32,
    pub end: u32,
}

/// The first two words of an image: initial stack pointer and reset handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VectorTable {
    pub stack_pointer: u32,
    pub reset_vector: u32,
}

impl VectorTable {
    pub fn from_words(words: [u32; 2]) -> Self {
        Self { stack_pointer: words[0], reset_vector: words[1] }
    }

    /// The stack pointer lies in RAM and the reset handler is a Thumb address
    /// inside the firmware area. Erased flash fails both checks.
    pub fn validate(&self, ram: &[RamWindow], layout: &FirmwareLayout<'_>) -> bool {
        let stack_ok = ram
            .iter()
            .any(|window| (window.start..=window.end).contains(&self.stack_pointer));
        let reset_ok = self.reset_vector & 1 == 1 && layout.contains(self.reset_vector & !1);
        if !stack_ok || !reset_ok {
            debug!("vector table rejected: sp {=u32:#x} reset {=u32:#x}", self.stack_pointer, self.reset_vector);
        }
        stack_ok && reset_ok
    }
}
