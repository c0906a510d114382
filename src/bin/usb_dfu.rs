//! DFU bootloader in flash sectors 0 and 1.
//!
//! Starts the firmware at [`FIRMWARE_OFFSET`] unless the retained word asks
//! for DFU mode, the button is held, or the firmware vector table is not
//! plausible. In DFU mode the internal flash is exposed over USB; a finished
//! download or a button release resets into the new firmware.
#![no_main]
#![no_std]

use bringup as _; // global logger + panicking-behavior + memory layout
use bringup::hardware::chrono::Chrono;
use bringup::hardware::flash::{self, FlashBridge, FIRMWARE_OFFSET, FLASH_BASE, RAM};
use bringup::hardware::{self, Button};
use bringup_common::boot::{boot_requested, VectorTable};
use bringup_common::debounce::Debouncer;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_rt::entry;
use hal::otg_fs::{UsbBus, USB};
use hal::pac;
use hal::prelude::*;
use stm32f4xx_hal as hal;
use usb_device::prelude::*;
use usbd_dfu::DFUClass;

const BUTTON: usize = 0;
const DEBOUNCE_SAMPLES: usize = 10;
/// Time for the last status response to reach the host before resetting.
const LEAVE_DELAY_MS: u32 = 50;
const BLINK_MS: u32 = 250;

fn button_level(button: &Button) -> u8 {
    button.is_high() as u8
}

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    let gpioa = dp.GPIOA.split();
    let button: Button = gpioa.pa0.into_pull_down_input();

    let magic = flash::magic();
    let layout = flash::layout().unwrap();
    let vectors = VectorTable::from_words(flash::firmware_vectors());
    let requested = boot_requested(magic, button.is_high());
    if !requested && vectors.validate(&RAM, &layout) {
        defmt::info!("starting firmware, reset {=u32:#x}", vectors.reset_vector);
        let table = FLASH_BASE + FIRMWARE_OFFSET;
        unsafe {
            cp.SCB.vtor.write(table);
            cortex_m::asm::bootload(table as *const u32)
        }
    }
    defmt::info!("dfu mode: magic {=u32:#x}, vectors {}", magic, vectors);

    let clocks = hardware::setup_clocks(dp.RCC);
    Chrono::start(&clocks);
    let gpiod = dp.GPIOD.split();
    let mut led = gpiod.pd12.into_push_pull_output();
    led.set_high();

    // Wraps every millisecond.
    let mut systick = cp.SYST;
    systick.set_clock_source(SystClkSource::Core);
    systick.set_reload(clocks.sysclk().raw() / 1000 - 1);
    systick.clear_current();
    systick.enable_counter();

    let usb = USB::new(
        (dp.OTG_FS_GLOBAL, dp.OTG_FS_DEVICE, dp.OTG_FS_PWRCLK),
        (gpioa.pa11, gpioa.pa12),
        &clocks,
    );
    let ep_memory = cortex_m::singleton!(: [u32; 1024] = [0; 1024]).unwrap();
    let usb_bus = UsbBus::new(usb, ep_memory);

    let mut dfu = DFUClass::new(&usb_bus, FlashBridge::new(dp.FLASH).unwrap());

    // https://pid.codes
    let mut usb_dev = UsbDeviceBuilder::new(&usb_bus, UsbVidPid(0x1209, 0x0001))
        .strings(&[StringDescriptors::default()
            .manufacturer("bringup")
            .product("bringup DFU bootloader")
            .serial_number(env!("CARGO_PKG_VERSION"))])
        .unwrap()
        .build();

    let mut debouncer = Debouncer::<1, DEBOUNCE_SAMPLES>::active_high();
    let mut leave_in = LEAVE_DELAY_MS;
    let mut ticks: u32 = 0;
    loop {
        usb_dev.poll(&mut [&mut dfu]);
        if !systick.has_wrapped() {
            continue;
        }

        // every 1 ms
        ticks = ticks.wrapping_add(1);
        if ticks % BLINK_MS == 0 {
            led.toggle();
        }
        if debouncer.debounce(&[button_level(&button)]).is_some() && debouncer.released(BUTTON) {
            defmt::info!("button released, leaving dfu mode");
            flash::reboot(false);
        }
        if FlashBridge::manifested() {
            leave_in -= 1;
            if leave_in == 0 {
                defmt::info!("download complete, leaving dfu mode");
                flash::reboot(false);
            }
        }
    }
}
