//! DS18B20 digital thermometer on a 1-Wire bus.

use heapless::Vec;

use super::onewire::{self, BitBus, Error, Rom};

pub const FAMILY_CODE: u8 = 0x28;

const CONVERT_T: u8 = 0x44;
const WRITE_SCRATCHPAD: u8 = 0x4E;
const READ_SCRATCHPAD: u8 = 0xBE;

/// Power-on alarm thresholds, written back unchanged.
const ALARM_HIGH: u8 = 0x4B;
const ALARM_LOW: u8 = 0x46;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    Bits9,
    Bits10,
    Bits11,
    #[default]
    Bits12,
}

impl Resolution {
    fn config_register(self) -> u8 {
        ((self as u8) << 5) | 0x1F
    }

    /// Worst-case conversion time.
    pub fn conversion_time_ms(self) -> u32 {
        750 >> (3 - self as u32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ds18b20 {
    rom: Rom,
    resolution: Resolution,
}

impl Ds18b20 {
    pub fn new<E>(rom: Rom, resolution: Resolution) -> Result<Self, Error<E>> {
        if rom.family() != FAMILY_CODE {
            return Err(Error::UnexpectedFamily(rom.family()));
        }
        Ok(Self { rom, resolution })
    }

    pub fn rom(&self) -> Rom {
        self.rom
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn configure<B: BitBus>(&self, bus: &mut B) -> Result<(), Error<B::Error>> {
        onewire::select(bus, &self.rom)?;
        bus.write_byte(WRITE_SCRATCHPAD)?;
        bus.write_bytes(&[ALARM_HIGH, ALARM_LOW, self.resolution.config_register()])?;
        Ok(())
    }

    pub fn start_conversion<B: BitBus>(&self, bus: &mut B) -> Result<(), Error<B::Error>> {
        onewire::select(bus, &self.rom)?;
        bus.write_byte(CONVERT_T)?;
        Ok(())
    }

    /// Last converted temperature, q12.4 °C.
    pub fn read_temperature<B: BitBus>(&self, bus: &mut B) -> Result<i16, Error<B::Error>> {
        onewire::select(bus, &self.rom)?;
        bus.write_byte(READ_SCRATCHPAD)?;
        let mut scratchpad = [0u8; 9];
        bus.read_bytes(&mut scratchpad)?;
        if onewire::crc8(&scratchpad) != 0 {
            return Err(Error::Crc);
        }
        // Undefined low bits at reduced resolution.
        let mask = !((1i16 << (3 - self.resolution as u8)) - 1);
        Ok(i16::from_le_bytes([scratchpad[0], scratchpad[1]]) & mask)
    }
}

/// Starts a conversion on every device on the bus.
pub fn start_conversion_all<B: BitBus>(bus: &mut B) -> Result<(), Error<B::Error>> {
    onewire::skip(bus)?;
    bus.write_byte(CONVERT_T)?;
    Ok(())
}

/// Writes the resolution back to each of `sensors`, after a power glitch
/// has reset them to their EEPROM defaults. Every sensor is tried; the ones
/// that failed come back with their error.
pub fn configure_all<'a, B: BitBus, const N: usize>(
    sensors: impl IntoIterator<Item = &'a Ds18b20>,
    bus: &mut B,
) -> Vec<(Rom, Error<B::Error>), N> {
    let mut failed = Vec::new();
    for sensor in sensors {
        if let Err(e) = sensor.configure(bus) {
            // More failures than slots only happens with N below the sensor count.
            let _ = failed.push((sensor.rom, e));
        }
    }
    failed
}
