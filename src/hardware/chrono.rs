//! Free-running microsecond counter on TIM2.
//!
//! TIM2 is 32 bits wide, so the count wraps after about 71 minutes. Interval
//! arithmetic is done modulo 2^32.

use fugit::MicrosDurationU32;

use super::hal;
use hal::rcc::Clocks;

pub struct Chrono;

impl Chrono {
    /// Starts counting at 1 MHz. The TIM2 clock has to be enabled before the
    /// RCC is constrained, see [`super::setup_clocks`].
    pub fn start(clocks: &Clocks) {
        let psc = clocks.timclk1().raw() / 1_000_000 - 1;
        let tim = Self::timer();
        tim.cr1.modify(|_, w| w.cen().disabled());
        #[allow(unused_unsafe)]
        tim.psc.write(|w| unsafe { w.psc().bits(psc as u16) });
        tim.arr.write(|w| w.arr().bits(u32::MAX));
        // Load the prescaler now instead of at the first overflow.
        tim.egr.write(|w| w.ug().set_bit());
        tim.sr.modify(|_, w| w.uif().clear_bit());
        tim.cr1.modify(|_, w| w.cen().enabled());
    }

    fn timer() -> &'static hal::pac::tim2::RegisterBlock {
        unsafe { &*hal::pac::TIM2::ptr() }
    }

    /// Reads zero until [`Chrono::start`] ran.
    #[inline(always)]
    pub fn now_us() -> u32 {
        Self::timer().cnt.read().cnt().bits()
    }

    pub fn elapsed(since: u32) -> MicrosDurationU32 {
        MicrosDurationU32::from_ticks(Self::now_us().wrapping_sub(since))
    }
}
