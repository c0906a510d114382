//! Internal flash behind the DFU class, and the retained request word.

use core::mem::MaybeUninit;
use core::ptr::{addr_of, addr_of_mut};
use core::sync::atomic::{AtomicBool, Ordering};

use bringup_common::boot::{FirmwareLayout, FlashRegion, LayoutError, RamWindow, DFU_MAGIC};
use cortex_m::peripheral::SCB;
use hal::flash::FlashExt;
use hal::pac::FLASH;
use usbd_dfu::{DFUManifestationError, DFUMemError, DFUMemIO};

use super::hal;

pub const FLASH_BASE: u32 = 0x0800_0000;
/// The bootloader owns sectors 0 and 1.
pub const FIRMWARE_OFFSET: u32 = 0x8000;

/// STM32F405 sector map, erase times at x8 parallelism.
pub const REGIONS: [FlashRegion; 3] = [
    FlashRegion { count: 4, size: 16 * 1024, erase_time_ms: 500 },
    FlashRegion { count: 1, size: 64 * 1024, erase_time_ms: 1100 },
    FlashRegion { count: 7, size: 128 * 1024, erase_time_ms: 2000 },
];

/// Initial stack pointer limits: SRAM1+2 and CCM RAM, top inclusive.
pub const RAM: [RamWindow; 2] = [
    RamWindow { start: 0x2000_0000, end: 0x2002_0000 },
    RamWindow { start: 0x1000_0000, end: 0x1001_0000 },
];

const TRANSFER_SIZE: usize = 128;

// Written by applications (or by the bootloader when leaving DFU mode) and read
// after reset. NOLOAD, so the runtime leaves it alone.
#[link_section = ".magic"]
static mut MAGIC: MaybeUninit<u32> = MaybeUninit::uninit();

static MANIFESTED: AtomicBool = AtomicBool::new(false);

/// The retained word, as found after reset.
pub fn magic() -> u32 {
    unsafe { addr_of!(MAGIC).read_volatile().assume_init() }
}

fn set_magic(value: u32) {
    unsafe { addr_of_mut!(MAGIC).write_volatile(MaybeUninit::new(value)) }
}

/// Resets the core, asking the bootloader to stay in DFU mode or not.
pub fn reboot(to_bootloader: bool) -> ! {
    set_magic(if to_bootloader { DFU_MAGIC } else { 0 });
    SCB::sys_reset()
}

pub fn layout() -> Result<FirmwareLayout<'static>, LayoutError> {
    FirmwareLayout::new(FLASH_BASE, &REGIONS, FIRMWARE_OFFSET)
}

/// First two words of the firmware image.
pub fn firmware_vectors() -> [u32; 2] {
    let table = (FLASH_BASE + FIRMWARE_OFFSET) as *const u32;
    unsafe { [table.read_volatile(), table.add(1).read_volatile()] }
}

/// DFU memory access to the firmware area of the internal flash.
pub struct FlashBridge {
    flash: FLASH,
    layout: FirmwareLayout<'static>,
    buffer: [u8; TRANSFER_SIZE],
    buffered: usize,
}

impl FlashBridge {
    pub fn new(flash: FLASH) -> Result<Self, LayoutError> {
        Ok(Self { flash, layout: layout()?, buffer: [0; TRANSFER_SIZE], buffered: 0 })
    }

    /// A complete image was downloaded and the host asked to leave.
    pub fn manifested() -> bool {
        MANIFESTED.load(Ordering::Relaxed)
    }

    fn offset(&self, address: u32) -> usize {
        (address - self.layout.base()) as usize
    }
}

impl DFUMemIO for FlashBridge {
    const INITIAL_ADDRESS_POINTER: u32 = FLASH_BASE + FIRMWARE_OFFSET;
    const PROGRAM_TIME_MS: u32 = 8;
    const ERASE_TIME_MS: u32 = 2000;
    const FULL_ERASE_TIME_MS: u32 = 2 * 500 + 1100 + 7 * 2000;
    const MEM_INFO_STRING: &'static str = "@Internal Flash  /0x08000000/02*016Ka,02*016Kg,01*064Kg,07*128Kg";
    const HAS_DOWNLOAD: bool = true;
    const HAS_UPLOAD: bool = true;

    fn read(&mut self, address: u32, length: usize) -> Result<&[u8], DFUMemError> {
        self.layout.check_range(address, length).map_err(|_| DFUMemError::Address)?;
        let offset = self.offset(address);
        Ok(&self.flash.read()[offset..offset + length])
    }

    fn erase(&mut self, address: u32) -> Result<(), DFUMemError> {
        let sector = self.layout.sector(address).map_err(|_| DFUMemError::Address)?;
        defmt::debug!("erase sector {=u16} at {=u32:#x}", sector.number, sector.address);
        self.flash
            .unlocked()
            .erase(sector.number as u8)
            .map_err(|_| DFUMemError::Erase)
    }

    fn erase_all(&mut self) -> Result<(), DFUMemError> {
        let mut flash = self.flash.unlocked();
        for sector in self.layout.firmware_sectors() {
            flash.erase(sector.number as u8).map_err(|_| DFUMemError::Erase)?;
        }
        Ok(())
    }

    fn store_write_buffer(&mut self, src: &[u8]) -> Result<(), ()> {
        let slot = self.buffer.get_mut(..src.len()).ok_or(())?;
        slot.copy_from_slice(src);
        self.buffered = src.len();
        Ok(())
    }

    fn program(&mut self, address: u32, length: usize) -> Result<(), DFUMemError> {
        if length > self.buffered {
            return Err(DFUMemError::Prog);
        }
        self.layout.check_range(address, length).map_err(|_| DFUMemError::Address)?;
        let offset = self.offset(address);
        self.flash
            .unlocked()
            .program(offset, self.buffer[..length].iter())
            .map_err(|_| DFUMemError::Prog)?;
        if self.flash.read()[offset..offset + length] != self.buffer[..length] {
            defmt::warn!("verify failed at {=u32:#x}", address);
            return Err(DFUMemError::Verify);
        }
        Ok(())
    }

    fn manifestation(&mut self) -> Result<(), DFUManifestationError> {
        defmt::info!("manifestation");
        MANIFESTED.store(true, Ordering::Relaxed);
        Ok(())
    }
}
