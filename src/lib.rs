#![no_main]
#![no_std]

use defmt_brtt as _; // global logger

use panic_probe as _;

use stm32f4xx_hal as _; // memory layout

pub mod hardware;

// same panicking *behavior* as `panic-probe` but doesn't print a panic message
// this prevents the panic message being printed *twice* when `defmt::panic` is
// invoked
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}

defmt::timestamp!("{=u32:us}", hardware::chrono::Chrono::now_us());
