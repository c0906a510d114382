//! DS18B20 thermometers on a 1-Wire bus on PA1.
//!
//! The bus is enumerated once at startup. Each sensor gets a number, which is
//! also its toggle key on the console.
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
    use bringup::hardware::{self, SYSCLK};
    use bringup_common::console::{self, SensorAction, SensorCommand, SensorControl};
    use bringup_common::drivers::ds18b20::{self, Ds18b20, Resolution};
    use bringup_common::drivers::onewire::{OneWirePin, Search};
    use bringup_common::fixed::{DataFormat, FormatOptions};
    use core::convert::Infallible;
    use core::fmt::Write;
    use cortex_m::interrupt;
    use hal::gpio::{OpenDrain, Output, Pin};
    use hal::pac::{TIM5, USART2};
    use hal::prelude::*;
    use hal::serial::Tx;
    use hal::timer::Delay;
    use heapless::Vec;
    use rtic::mutex::prelude::*;
    use rtic_monotonics::systick::*;
    use rtic_sync::{channel::*, make_channel};
    use stm32f4xx_hal as hal;

    const BAUD: u32 = 115_200;
    const CAPACITY: usize = 16;
    const MAX_SENSORS: usize = 8;
    const RESOLUTION: Resolution = Resolution::Bits12;
    const TIMER_PERIOD_MS: u32 = 1000;

    type Console2 = Console<Tx<USART2>>;
    type Bus = OneWirePin<Pin<'A', 1, Output<OpenDrain>>, Delay<TIM5, 1_000_000>>;

    pub struct Wire {
        bus: Bus,
        sensors: Vec<Ds18b20, MAX_SENSORS>,
        format: DataFormat,
    }

    #[shared]
    struct Shared {
        wire: Wire,
        console: Console2,
        control: SensorControl<MAX_SENSORS>,
    }

    #[local]
    struct Local {
        rx: ConsoleRx,
        sender: Sender<'static, u8, CAPACITY>,
        count: usize,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        defmt::info!("init");
        let clocks = hardware::setup_clocks(cx.device.RCC);
        Chrono::start(&clocks);
        let systick_mono_token = rtic_monotonics::create_systick_token!();
        Systick::start(cx.core.SYST, SYSCLK.raw(), systick_mono_token);
        let delay = cx.device.TIM5.delay_us(&clocks);

        let gpioa = cx.device.GPIOA.split();
        let (mut console, rx) = serial::usart2(cx.device.USART2, gpioa.pa2, gpioa.pa3, BAUD, &clocks);
        console.println("DS18B20 example");

        let mut bus = OneWirePin::new(gpioa.pa1.into_open_drain_output(), delay).unwrap();
        let sensors = enumerate(&mut bus, &mut console);
        let count = sensors.len();
        write!(console, "{} sensor(s)\r\n", count).ok();
        let wire = Wire { bus, sensors, format: DataFormat::parse("i12q4").unwrap() };
        console::write_help(&mut console, &CHANNELS[..count], true).ok();

        let (sender, receiver) = make_channel!(u8, CAPACITY);
        ui::spawn(receiver).unwrap();
        stream::spawn().unwrap();
        ticker::spawn().unwrap();

        (Shared { wire, console, control: SensorControl::new() }, Local { rx, sender, count })
    }

    const CHANNELS: [&str; MAX_SENSORS] = ["1", "2", "3", "4", "5", "6", "7", "8"];

    /// Registers up to [`MAX_SENSORS`] thermometers.
    fn enumerate(bus: &mut Bus, console: &mut Console2) -> Vec<Ds18b20, MAX_SENSORS> {
        let mut sensors = Vec::new();
        let mut search = Search::new();
        while !sensors.is_full() {
            let rom = match interrupt::free(|_| search.next(&mut *bus)) {
                Ok(Some(rom)) => rom,
                Ok(None) => break,
                Err(e) => {
                    write!(console, "search failed: {}\r\n", e).ok();
                    break;
                }
            };
            let sensor = match Ds18b20::new::<Infallible>(rom, RESOLUTION) {
                Ok(sensor) => sensor,
                Err(e) => {
                    write!(console, "{}: {}\r\n", rom, e).ok();
                    continue;
                }
            };
            if let Err(e) = interrupt::free(|_| sensor.configure(&mut *bus)) {
                write!(console, "{}: {}\r\n", rom, e).ok();
                continue;
            }
            if sensors.push(sensor).is_ok() {
                defmt::info!("{} registered as {=usize}", rom, sensors.len());
                write!(console, "{}: registered as {}\r\n", rom, sensors.len()).ok();
            }
        }
        sensors
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

    /// One conversion on every sensor, then a line per enabled sensor.
    #[task(shared = [wire, console, control])]
    async fn convert(mut cx: convert::Context) {
        let started = cx.shared.wire.lock(|wire| interrupt::free(|_| ds18b20::start_conversion_all(&mut wire.bus)));
        if let Err(e) = started {
            cx.shared.console.lock(|console| write!(console, "convert failed: {}\r\n", e).ok());
            return;
        }
        let start = Chrono::now_us();
        Systick::delay(RESOLUTION.conversion_time_ms().millis()).await;
        defmt::debug!("conversion took {}", Chrono::elapsed(start));

        (&mut cx.shared.wire, &mut cx.shared.console, &mut cx.shared.control).lock(|wire, console, control| {
            for channel in control.enabled_channels() {
                let Some(sensor) = wire.sensors.get(channel).copied() else {
                    break;
                };
                console::write_label(console, channel + 1).ok();
                match interrupt::free(|_| sensor.read_temperature(&mut wire.bus)) {
                    Ok(temperature) => {
                        console.write_values(&[temperature], &wire.format, FormatOptions::default());
                        console.println("");
                    }
                    Err(e) => {
                        write!(console, " {}\r\n", e).ok();
                    }
                }
            }
        });
    }

    #[task(shared = [control])]
    async fn stream(mut cx: stream::Context) {
        loop {
            if cx.shared.control.lock(|control| control.is_automatic()) {
                convert::spawn().ok();
            }
            Systick::delay((RESOLUTION.conversion_time_ms() + 50).millis()).await;
        }
    }

    #[task(shared = [control])]
    async fn ticker(mut cx: ticker::Context) {
        loop {
            Systick::delay(TIMER_PERIOD_MS.millis()).await;
            if cx.shared.control.lock(|control| control.is_timed()) {
                convert::spawn().ok();
            }
        }
    }

    /// Rewrites the resolution of every enabled sensor.
    fn reset(cx: &mut ui::Context) {
        (&mut cx.shared.wire, &mut cx.shared.console, &mut cx.shared.control).lock(|wire, console, control| {
            let Wire { bus, sensors, .. } = wire;
            let selected = control.enabled_channels().filter_map(|channel| sensors.get(channel));
            let failed: Vec<_, MAX_SENSORS> = interrupt::free(|_| ds18b20::configure_all(selected, bus));
            for (rom, e) in failed {
                write!(console, "{}: reset failed: {}\r\n", rom, e).ok();
            }
        });
    }

    #[task(local = [count], shared = [wire, console, control])]
    async fn ui(mut cx: ui::Context, mut receiver: Receiver<'static, u8, CAPACITY>) {
        let count = *cx.local.count;
        while let Ok(byte) = receiver.recv().await {
            let Some(command) = SensorCommand::parse(byte, count) else {
                continue;
            };
            let action = cx.shared.control.lock(|control| control.handle(command));
            cx.shared.console.lock(|console| {
                console::write_status(console, action, &CHANNELS[..count]).ok();
                if action == SensorAction::Help {
                    console::write_help(console, &CHANNELS[..count], true).ok();
                }
            });
            if action == SensorAction::Reset {
                reset(&mut cx);
            }
            if action == SensorAction::Sample {
                convert::spawn().ok();
            }
        }
    }
}
