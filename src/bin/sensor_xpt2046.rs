//! XPT2046 touch controller on SPI2, pen interrupt on PC8.
//!
//! Prints calibrated `x y pressure` triples. Automatic mode polls while the
//! pen is down; time-triggered mode samples on a fixed period.
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
    use bringup::hardware::serial::{self, Console, ConsoleRx};
    use bringup::hardware::{self, SYSCLK, TOUCH_FREQ};
    use bringup_common::console::{self, SensorAction, SensorCommand, SensorControl};
    use bringup_common::drivers::xpt2046::{self, Xpt2046};
    use bringup_common::fixed::{DataFormat, FormatOptions};
    use core::fmt::Write;
    use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
    use hal::gpio::{Input, Output, Pin};
    use hal::pac::USART2;
    use hal::prelude::*;
    use hal::serial::Tx;
    use hal::spi::Spi2;
    use rtic_monotonics::systick::*;
    use rtic_sync::{channel::*, make_channel};
    use stm32f4xx_hal as hal;

    const BAUD: u32 = 115_200;
    const CAPACITY: usize = 16;
    const POLL_PERIOD_MS: u32 = 20;
    const TIMER_PERIOD_MS: u32 = 500;
    /// A single channel, so no digit toggles.
    const CHANNELS: [&str; 0] = [];
    const OUTPUT: FormatOptions = FormatOptions::new(false, 0);

    type Console2 = Console<Tx<USART2>>;
    type TouchSpi = ExclusiveDevice<Spi2, Pin<'C', 7, Output>, NoDelay>;

    pub struct Touch {
        xpt: Xpt2046<TouchSpi>,
        pen: Pin<'C', 8, Input>,
        format: DataFormat,
    }

    impl Touch {
        /// PENIRQ is pulled low while the panel is pressed.
        fn pen_down(&self) -> bool {
            self.pen.is_low()
        }
    }

    #[shared]
    struct Shared {
        touch: Touch,
        console: Console2,
        control: SensorControl<1>,
    }

    #[local]
    struct Local {
        rx: ConsoleRx,
        sender: Sender<'static, u8, CAPACITY>,
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

        // Other devices on SPI2 stay deselected.
        let _display_cs = hardware::chip_select(gpiob.pb12);
        let _flash_cs = hardware::chip_select(gpioc.pc6);

        let spi = hardware::spi2(cx.device.SPI2, gpiob.pb13, gpiob.pb14, gpiob.pb15, TOUCH_FREQ, &clocks);
        let device = ExclusiveDevice::new(spi, hardware::chip_select(gpioc.pc7), NoDelay);
        let touch = Touch {
            xpt: Xpt2046::new(device, xpt2046::Config::default()),
            pen: gpioc.pc8.into_pull_up_input(),
            format: DataFormat::parse("i16i16i16").unwrap(),
        };

        let (mut console, rx) = serial::usart2(cx.device.USART2, gpioa.pa2, gpioa.pa3, BAUD, &clocks);
        console.println("XPT2046 touch example");
        console::write_help(&mut console, &CHANNELS, true).ok();

        let (sender, receiver) = make_channel!(u8, CAPACITY);
        ui::spawn(receiver).unwrap();
        stream::spawn().unwrap();
        ticker::spawn().unwrap();

        (Shared { touch, console, control: SensorControl::new() }, Local { rx, sender })
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

    #[task(shared = [touch, console, control])]
    async fn stream(mut cx: stream::Context) {
        loop {
            Systick::delay(POLL_PERIOD_MS.millis()).await;
            (&mut cx.shared.touch, &mut cx.shared.console, &mut cx.shared.control).lock(|touch, console, control| {
                if control.is_automatic() && touch.pen_down() {
                    report(touch, console, false);
                }
            });
        }
    }

    #[task(shared = [touch, console, control])]
    async fn ticker(mut cx: ticker::Context) {
        loop {
            Systick::delay(TIMER_PERIOD_MS.millis()).await;
            (&mut cx.shared.touch, &mut cx.shared.console, &mut cx.shared.control).lock(|touch, console, control| {
                if control.is_timed() {
                    report(touch, console, false);
                }
            });
        }
    }

    #[task(shared = [touch, console, control])]
    async fn ui(mut cx: ui::Context, mut receiver: Receiver<'static, u8, CAPACITY>) {
        while let Ok(byte) = receiver.recv().await {
            let Some(command) = SensorCommand::parse(byte, CHANNELS.len()) else {
                continue;
            };
            (&mut cx.shared.touch, &mut cx.shared.console, &mut cx.shared.control).lock(|touch, console, control| {
                let action = control.handle(command);
                console::write_status(console, action, &CHANNELS).ok();
                match action {
                    SensorAction::Help => {
                        console::write_help(console, &CHANNELS, true).ok();
                    }
                    SensorAction::Reset => {
                        touch.xpt.reset_calibration();
                        console.println("calibration reset");
                    }
                    SensorAction::Sample => report(touch, console, true),
                    _ => {}
                }
            });
        }
    }

    /// `verbose` also reports the absence of a touch.
    fn report(touch: &mut Touch, console: &mut Console2, verbose: bool) {
        match touch.xpt.sample() {
            Ok(Some(sample)) => {
                defmt::trace!("{} touch {}", Chrono::now_us(), sample);
                console.write_values(&sample.to_array(), &touch.format, OUTPUT);
                console.println("");
            }
            Ok(None) if verbose => console.println("no touch"),
            Ok(None) => {}
            Err(e) => {
                write!(console, "read failed: {:?}\r\n", e).ok();
            }
        }
    }
}
