//! ST7735 test patterns, driven from the serial console.
//!
//! `1`..`5` pick a page (again to cycle its style), `c` the next colour and
//! `r` rotates the panel. Every redraw reports how long it took.
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
    use bringup::hardware::display::{self, Tft};
    use bringup::hardware::serial::{self, Console, ConsoleRx};
    use bringup::hardware::{self, SPI2_FREQ, SYSCLK};
    use bringup_common::console::{DisplayCommand, DisplayControl};
    use core::fmt::Write;
    use embedded_graphics::Drawable;
    use hal::pac::USART2;
    use hal::prelude::*;
    use hal::serial::Tx;
    use rtic_sync::{channel::*, make_channel};
    use stm32f4xx_hal as hal;

    const BAUD: u32 = 19_200;
    const CAPACITY: usize = 16;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        rx: ConsoleRx,
        sender: Sender<'static, u8, CAPACITY>,
        console: Console<Tx<USART2>>,
        tft: Tft,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        defmt::info!("init");
        let clocks = hardware::setup_clocks(cx.device.RCC);
        Chrono::start(&clocks);
        let mut delay = cx.device.TIM5.delay_us(&clocks);

        let gpioa = cx.device.GPIOA.split();
        let gpiob = cx.device.GPIOB.split();
        let gpioc = cx.device.GPIOC.split();

        // Other devices on SPI2 stay deselected.
        let _flash_cs = hardware::chip_select(gpioc.pc6);
        let _touch_cs = hardware::chip_select(gpioc.pc7);

        let mut backlight = gpiob.pb1.into_push_pull_output();
        let spi = hardware::spi2(cx.device.SPI2, gpiob.pb13, gpiob.pb14, gpiob.pb15, SPI2_FREQ, &clocks);
        let mut tft = display::tft(
            spi,
            hardware::chip_select(gpiob.pb12),
            gpiob.pb11.into_push_pull_output(),
            gpiob.pb10.into_push_pull_output(),
        );
        defmt::info!("display init");
        tft.init(&mut delay).unwrap();
        backlight.set_high();

        let (mut console, rx) = serial::usart2(cx.device.USART2, gpioa.pa2, gpioa.pa3, BAUD, &clocks);
        console.println("ST7735 display example");
        console.println("1-5: page, c: colour, r: rotate");
        defmt::info!("sysclk {=u32} Hz", SYSCLK.raw());

        let (sender, receiver) = make_channel!(u8, CAPACITY);
        ui::spawn(receiver).unwrap();

        (Shared {}, Local { rx, sender, console, tft })
    }

    #[task(binds = USART2, priority = 2, local = [rx, sender])]
    fn usart2(cx: usart2::Context) {
        let sender = cx.local.sender;
        serial::drain(cx.local.rx, |byte| {
            if sender.try_send(byte).is_err() {
                defmt::warn!("console: dropped {=u8:#x}", byte);
            }
        });
    }

    #[task(local = [console, tft, control: DisplayControl = DisplayControl::new()])]
    async fn ui(cx: ui::Context, mut receiver: Receiver<'static, u8, CAPACITY>) {
        let console = cx.local.console;
        let tft = cx.local.tft;
        let control = cx.local.control;
        draw(tft, console, control);
        while let Ok(byte) = receiver.recv().await {
            let Some(command) = DisplayCommand::parse(byte) else {
                continue;
            };
            if let Some(orientation) = control.handle(command) {
                defmt::debug!("orientation {}", orientation);
                tft.set_orientation(orientation).unwrap();
            }
            draw(tft, console, control);
        }
    }

    fn draw(tft: &mut Tft, console: &mut Console<Tx<USART2>>, control: &DisplayControl) {
        let pattern = control.pattern();
        let start = Chrono::now_us();
        pattern.draw(tft).unwrap();
        let took = Chrono::elapsed(start);
        defmt::info!("{} drawn in {}", pattern, took);
        write!(
            console,
            "{:?} colour {} style {}: {} us\r\n",
            pattern.page,
            pattern.color,
            pattern.style,
            took.ticks()
        )
        .ok();
    }
}
