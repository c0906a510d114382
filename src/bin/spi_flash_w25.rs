//! W25Q NOR flash on SPI2, exercised with an erase/program/verify pass every
//! few seconds. The LED is on while a pass runs and stays on after a failure.
#![no_main]
#![no_std]
#![feature(type_alias_impl_trait)]

use bringup as _; // global logger + panicking-behavior + memory layout
use rtic::app;

#[app(
    device = stm32f4xx_hal::pac,
    peripherals = true,
    dispatchers = [TIM3]
)]
mod app {
    use bringup::hardware::chrono::Chrono;
    use bringup::hardware::serial::{self, Console};
    use bringup::hardware::{self, Led, SPI2_FREQ, SYSCLK};
    use bringup_common::drivers::w25::{self, W25};
    use bringup_common::memtest::MemoryTest;
    use core::fmt::Write;
    use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
    use hal::gpio::{Output, Pin};
    use hal::pac::USART2;
    use hal::prelude::*;
    use hal::serial::Tx;
    use hal::spi::Spi2;
    use rtic_monotonics::systick::*;
    use stm32f4xx_hal as hal;

    const BAUD: u32 = 115_200;
    const PERIOD_MS: u32 = 5000;
    const WINDOW: usize = w25::SECTOR_SIZE as usize;

    type Flash = W25<ExclusiveDevice<Spi2, Pin<'C', 6, Output>, NoDelay>>;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        flash: Flash,
        led: Led,
        console: Console<Tx<USART2>>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        defmt::info!("init");
        let clocks = hardware::setup_clocks(cx.device.RCC);
        Chrono::start(&clocks);
        let systick_mono_token = rtic_monotonics::create_systick_token!();
        Systick::start(cx.core.SYST, SYSCLK.raw(), systick_mono_token);

        let gpioa = cx.device.GPIOA.split();
        let gpiob = cx.device.GPIOB.split();
        let gpioc = cx.device.GPIOC.split();
        let gpiod = cx.device.GPIOD.split();
        let led = gpiod.pd12.into_push_pull_output();

        // Other devices on SPI2 stay deselected.
        let _display_cs = hardware::chip_select(gpiob.pb12);
        let _touch_cs = hardware::chip_select(gpioc.pc7);

        let (mut console, _rx) = serial::usart2(cx.device.USART2, gpioa.pa2, gpioa.pa3, BAUD, &clocks);
        console.println("W25 SPI flash example");

        let spi = hardware::spi2(cx.device.SPI2, gpiob.pb13, gpiob.pb14, gpiob.pb15, SPI2_FREQ, &clocks);
        let device = ExclusiveDevice::new(spi, hardware::chip_select(gpioc.pc6), NoDelay);
        let flash = W25::new(device).unwrap();
        write!(console, "capacity {} KiB\r\n", flash.capacity() / 1024).ok();

        memtest::spawn().unwrap();

        (Shared {}, Local { flash, led, console })
    }

    #[task(local = [flash, led, console, test: MemoryTest = MemoryTest::new(0), buffer: [u8; WINDOW] = [0; WINDOW]])]
    async fn memtest(cx: memtest::Context) {
        let flash = cx.local.flash;
        let led = cx.local.led;
        let console = cx.local.console;
        let test = cx.local.test;
        let buffer = cx.local.buffer;
        loop {
            Systick::delay(PERIOD_MS.millis()).await;
            led.set_high();
            let start = Chrono::now_us();
            match test.run(&mut *flash, &mut buffer[..]) {
                Ok((address, erase)) => {
                    led.set_low();
                    let took = Chrono::elapsed(start);
                    defmt::info!("memtest at {=u32:#x} passed in {}", address, took);
                    write!(console, "{:#08x}: ok, {:?} erase, {} us\r\n", address, erase, took.ticks()).ok();
                }
                Err(e) => {
                    defmt::error!("memtest failed");
                    write!(console, "memtest failed: {}\r\n", e).ok();
                }
            }
        }
    }
}
