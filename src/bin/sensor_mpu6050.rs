//! MPU-6050 on I2C1 with the data-ready line on PB5.
//!
//! Streams acceleration, angular rate and die temperature to the console,
//! either on every data-ready interrupt (automatic mode) or on a fixed
//! period (time-triggered mode).
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
    use bringup::hardware::{self, Led, SYSCLK};
    use bringup_common::console::{self, SensorAction, SensorCommand, SensorControl};
    use bringup_common::drivers::mpu60xx::{self, Mpu60xx};
    use bringup_common::fixed::{DataFormat, FormatOptions};
    use core::fmt::Write;
    use hal::gpio::{Edge, ExtiPin, Input, Pin};
    use hal::i2c::I2c1;
    use hal::pac::{TIM5, USART2};
    use hal::prelude::*;
    use hal::serial::Tx;
    use hal::timer::Delay;
    use rtic_monotonics::systick::*;
    use rtic_sync::{channel::*, make_channel};
    use stm32f4xx_hal as hal;

    const BAUD: u32 = 115_200;
    const CAPACITY: usize = 16;
    const SAMPLE_RATE: u16 = 20;
    const TIMER_PERIOD_MS: u32 = 500;
    const CHANNELS: [&str; 3] = ["accelerometer", "gyroscope", "thermometer"];
    const ACCEL: usize = 0;
    const GYRO: usize = 1;
    const THERMO: usize = 2;

    type Console2 = Console<Tx<USART2>>;

    pub struct Imu {
        mpu: Mpu60xx<I2c1>,
        led: Led,
        vector: DataFormat,
        scalar: DataFormat,
    }

    #[shared]
    struct Shared {
        imu: Imu,
        console: Console2,
        control: SensorControl<3>,
    }

    #[local]
    struct Local {
        rx: ConsoleRx,
        sender: Sender<'static, u8, CAPACITY>,
        int: Pin<'B', 5, Input>,
        delay: Delay<TIM5, 1_000_000>,
    }

    #[init]
    fn init(mut cx: init::Context) -> (Shared, Local) {
        defmt::info!("init");
        let clocks = hardware::setup_clocks(cx.device.RCC);
        Chrono::start(&clocks);
        let systick_mono_token = rtic_monotonics::create_systick_token!();
        Systick::start(cx.core.SYST, SYSCLK.raw(), systick_mono_token);
        let mut delay = cx.device.TIM5.delay_us(&clocks);

        let gpioa = cx.device.GPIOA.split();
        let gpiob = cx.device.GPIOB.split();
        let gpiod = cx.device.GPIOD.split();
        let led = gpiod.pd12.into_push_pull_output();

        let mut syscfg = cx.device.SYSCFG.constrain();
        let mut int = gpiob.pb5.into_pull_down_input();
        int.make_interrupt_source(&mut syscfg);
        int.enable_interrupt(&mut cx.device.EXTI);
        int.trigger_on_edge(&mut cx.device.EXTI, Edge::Rising);

        let i2c = hardware::i2c1(cx.device.I2C1, gpiob.pb8, gpiob.pb9, &clocks);
        let config = mpu60xx::Config {
            sample_rate: SAMPLE_RATE,
            data_ready_interrupt: true,
            ..Default::default()
        };
        let mut mpu = Mpu60xx::new(i2c, config);
        mpu.reset(&mut delay).unwrap();

        let imu = Imu {
            mpu,
            led,
            vector: DataFormat::parse("i16q16i16q16i16q16").unwrap(),
            scalar: DataFormat::parse("i24q8").unwrap(),
        };

        let (mut console, rx) = serial::usart2(cx.device.USART2, gpioa.pa2, gpioa.pa3, BAUD, &clocks);
        console.println("MPU-6050 example");
        console::write_help(&mut console, &CHANNELS, true).ok();

        let (sender, receiver) = make_channel!(u8, CAPACITY);
        ui::spawn(receiver).unwrap();
        ticker::spawn().unwrap();

        (
            Shared { imu, console, control: SensorControl::new() },
            Local { rx, sender, int, delay },
        )
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

    #[task(binds = EXTI9_5, local = [int], shared = [imu, console, control])]
    fn data_ready(mut cx: data_ready::Context) {
        cx.local.int.clear_interrupt_pending_bit();
        (&mut cx.shared.imu, &mut cx.shared.console, &mut cx.shared.control).lock(|imu, console, control| {
            if control.is_automatic() {
                report(imu, console, control);
            }
        });
    }

    #[task(shared = [imu, console, control])]
    async fn ticker(mut cx: ticker::Context) {
        loop {
            Systick::delay(TIMER_PERIOD_MS.millis()).await;
            (&mut cx.shared.imu, &mut cx.shared.console, &mut cx.shared.control).lock(|imu, console, control| {
                if control.is_timed() {
                    report(imu, console, control);
                }
            });
        }
    }

    #[task(local = [delay], shared = [imu, console, control])]
    async fn ui(mut cx: ui::Context, mut receiver: Receiver<'static, u8, CAPACITY>) {
        let delay = cx.local.delay;
        while let Ok(byte) = receiver.recv().await {
            let Some(command) = SensorCommand::parse(byte, CHANNELS.len()) else {
                continue;
            };
            (&mut cx.shared.imu, &mut cx.shared.console, &mut cx.shared.control).lock(|imu, console, control| {
                let action = control.handle(command);
                defmt::debug!("{} -> {}", command, action);
                console::write_status(console, action, &CHANNELS).ok();
                match action {
                    SensorAction::Help => {
                        console::write_help(console, &CHANNELS, true).ok();
                    }
                    SensorAction::Reset => match imu.mpu.reset(&mut *delay) {
                        Ok(()) => console.println("sensor reset"),
                        Err(e) => {
                            write!(console, "reset failed: {}\r\n", e).ok();
                        }
                    },
                    // Reading clears a latched data-ready line, so streaming restarts.
                    SensorAction::Sample | SensorAction::Start => report(imu, console, control),
                    _ => {}
                }
            });
        }
    }

    fn report(imu: &mut Imu, console: &mut Console2, control: &SensorControl<3>) {
        let measurement = match imu.mpu.measure() {
            Ok(measurement) => measurement,
            Err(e) => {
                write!(console, "read failed: {}\r\n", e).ok();
                return;
            }
        };
        let now = Chrono::now_us();
        let options = FormatOptions::default();
        if control.is_enabled(ACCEL) {
            console::write_label(console, format_args!("{} a", now)).ok();
            console.write_values(&measurement.accel, &imu.vector, options);
            console.println(" g");
        }
        if control.is_enabled(GYRO) {
            console::write_label(console, format_args!("{} w", now)).ok();
            console.write_values(&measurement.gyro, &imu.vector, options);
            console.println(" rad/s");
            imu.led.toggle();
        }
        if control.is_enabled(THERMO) {
            console::write_label(console, format_args!("{} T", now)).ok();
            console.write_values(&[measurement.temperature], &imu.scalar, options);
            console.println(" C");
        }
    }
}
