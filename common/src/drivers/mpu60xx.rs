//! InvenSense MPU-6000/6050 six-axis IMU over I2C.
//!
//! Readings are returned in fixed point so they can be printed with
//! [`crate::fixed::write_values`]:
//!
//! | Quantity | Format | Unit |
//! | -------- | ------ | ---- |
//! | acceleration | `i16q16` x3 | g |
//! | angular rate | `i16q16` x3 | rad/s |
//! | temperature | `i24q8` | °C |

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

pub const DEFAULT_ADDRESS: u8 = 0x68;

const IDENTITY: u8 = 0x68;

mod register {
    pub const SMPLRT_DIV: u8 = 0x19;
    pub const CONFIG: u8 = 0x1A;
    pub const GYRO_CONFIG: u8 = 0x1B;
    pub const ACCEL_CONFIG: u8 = 0x1C;
    pub const INT_PIN_CFG: u8 = 0x37;
    pub const INT_ENABLE: u8 = 0x38;
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    pub const PWR_MGMT_1: u8 = 0x6B;
    pub const WHO_AM_I: u8 = 0x75;
}

const PWR_RESET: u8 = 0x80;
/// Clock from the X gyro PLL.
const PWR_CLK_PLL_X: u8 = 0x01;
/// 44 Hz low-pass; gyro output rate 1 kHz.
const DLPF_44HZ: u8 = 0x03;
const GYRO_OUTPUT_RATE: u16 = 1000;
/// INT pin latched until any read.
const INT_LATCH_ANY_READ: u8 = 0x30;
const INT_DATA_READY: u8 = 0x01;

const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRange {
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

impl AccelRange {
    fn lsb_per_g(self) -> i32 {
        16384 >> (self as u8)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroRange {
    Dps250 = 0,
    Dps500 = 1,
    Dps1000 = 2,
    Dps2000 = 3,
}

impl GyroRange {
    fn lsb_per_dps(self) -> f32 {
        match self {
            Self::Dps250 => 131.0,
            Self::Dps500 => 65.5,
            Self::Dps1000 => 32.8,
            Self::Dps2000 => 16.4,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub address: u8,
    /// Output data rate, 4 to 1000 Hz.
    pub sample_rate: u16,
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
    /// Drive the INT pin on data ready.
    pub data_ready_interrupt: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            sample_rate: 100,
            accel_range: AccelRange::G16,
            gyro_range: GyroRange::Dps2000,
            data_ready_interrupt: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error<E> {
    I2c(E),
    /// `WHO_AM_I` returned something other than an MPU-60x0.
    Identity(u8),
    SampleRate(u16),
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Self::I2c(e)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(e) => write!(f, "i2c: {:?}", e),
            Self::Identity(id) => write!(f, "unexpected WHO_AM_I {:#04x}", id),
            Self::SampleRate(rate) => write!(f, "sample rate {} Hz out of range", rate),
        }
    }
}

/// One burst read of all sensor registers, already converted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    pub accel: [i32; 3],
    pub gyro: [i32; 3],
    pub temperature: i32,
}

pub struct Mpu60xx<I2C> {
    i2c: I2C,
    config: Config,
}

impl<I2C: I2c> Mpu60xx<I2C> {
    pub fn new(i2c: I2C, config: Config) -> Self {
        Self { i2c, config }
    }

    /// Resets the device, checks its identity and applies the configuration.
    pub fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<I2C::Error>> {
        let rate = self.config.sample_rate;
        if !(4..=GYRO_OUTPUT_RATE).contains(&rate) {
            return Err(Error::SampleRate(rate));
        }

        self.write(register::PWR_MGMT_1, PWR_RESET)?;
        delay.delay_ms(100);

        let identity = self.read(register::WHO_AM_I)?;
        if identity != IDENTITY {
            warn!("mpu60xx: WHO_AM_I {=u8:#x}", identity);
            return Err(Error::Identity(identity));
        }

        self.write(register::PWR_MGMT_1, PWR_CLK_PLL_X)?;
        self.write(register::CONFIG, DLPF_44HZ)?;
        self.write(register::SMPLRT_DIV, (GYRO_OUTPUT_RATE / rate - 1) as u8)?;
        self.write(register::GYRO_CONFIG, (self.config.gyro_range as u8) << 3)?;
        self.write(register::ACCEL_CONFIG, (self.config.accel_range as u8) << 3)?;
        if self.config.data_ready_interrupt {
            self.write(register::INT_PIN_CFG, INT_LATCH_ANY_READ)?;
            self.write(register::INT_ENABLE, INT_DATA_READY)?;
        } else {
            self.write(register::INT_ENABLE, 0)?;
        }
        debug!("mpu60xx configured at {=u16} Hz", rate);
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Raw big-endian words: accel xyz, temperature, gyro xyz.
    pub fn read_raw(&mut self) -> Result<[i16; 7], Error<I2C::Error>> {
        let mut buffer = [0u8; 14];
        self.i2c.write_read(self.config.address, &[register::ACCEL_XOUT_H], &mut buffer)?;
        let mut raw = [0i16; 7];
        for (word, bytes) in raw.iter_mut().zip(buffer.chunks_exact(2)) {
            *word = i16::from_be_bytes([bytes[0], bytes[1]]);
        }
        Ok(raw)
    }

    pub fn measure(&mut self) -> Result<Measurement, Error<I2C::Error>> {
        let raw = self.read_raw()?;
        let accel = self.config.accel_range;
        let gyro = self.config.gyro_range;
        Ok(Measurement {
            accel: [0, 1, 2].map(|i| accel_to_g(raw[i], accel)),
            temperature: temperature_to_celsius(raw[3]),
            gyro: [4, 5, 6].map(|i| gyro_to_rad(raw[i], gyro)),
        })
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.config.address, &[register, value])
    }

    fn read(&mut self, register: u8) -> Result<u8, I2C::Error> {
        let mut value = [0];
        self.i2c.write_read(self.config.address, &[register], &mut value)?;
        Ok(value[0])
    }
}

/// q16.16 g.
pub fn accel_to_g(raw: i16, range: AccelRange) -> i32 {
    (i32::from(raw) << 16) / range.lsb_per_g()
}

/// q16.16 rad/s.
pub fn gyro_to_rad(raw: i16, range: GyroRange) -> i32 {
    (f32::from(raw) * (65536.0 * DEG_TO_RAD) / range.lsb_per_dps()) as i32
}

/// q24.8 °C: `raw / 340 + 36.53`.
pub fn temperature_to_celsius(raw: i16) -> i32 {
    i32::from(raw) * 256 / 340 + 9352
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDelay, MockI2c};

    fn device() -> MockI2c {
        let mut i2c = MockI2c::new(DEFAULT_ADDRESS);
        i2c.registers[usize::from(register::WHO_AM_I)] = IDENTITY;
        i2c
    }

    #[test]
    fn reset_configures_registers() {
        let mut mpu = Mpu60xx::new(device(), Config::default());
        mpu.reset(&mut MockDelay::default()).unwrap();
        let i2c = mpu.release();
        assert_eq!(
            i2c.writes,
            vec![
                (register::PWR_MGMT_1, PWR_RESET),
                (register::PWR_MGMT_1, PWR_CLK_PLL_X),
                (register::CONFIG, DLPF_44HZ),
                (register::SMPLRT_DIV, 9),
                (register::GYRO_CONFIG, 0x18),
                (register::ACCEL_CONFIG, 0x18),
                (register::INT_ENABLE, 0),
            ]
        );
    }

    #[test]
    fn data_ready_interrupt() {
        let config = Config { data_ready_interrupt: true, sample_rate: 1000, ..Config::default() };
        let mut mpu = Mpu60xx::new(device(), config);
        mpu.reset(&mut MockDelay::default()).unwrap();
        let i2c = mpu.release();
        assert_eq!(i2c.registers[usize::from(register::SMPLRT_DIV)], 0);
        assert_eq!(i2c.registers[usize::from(register::INT_ENABLE)], INT_DATA_READY);
        assert_eq!(i2c.registers[usize::from(register::INT_PIN_CFG)], INT_LATCH_ANY_READ);
    }

    #[test]
    fn rejects_foreign_device() {
        let mut i2c = device();
        i2c.registers[usize::from(register::WHO_AM_I)] = 0x71;
        let mut mpu = Mpu60xx::new(i2c, Config::default());
        assert_eq!(mpu.reset(&mut MockDelay::default()), Err(Error::Identity(0x71)));
    }

    #[test]
    fn rejects_sample_rate() {
        let config = Config { sample_rate: 2000, ..Config::default() };
        let mut mpu = Mpu60xx::new(device(), config);
        assert_eq!(mpu.reset(&mut MockDelay::default()), Err(Error::SampleRate(2000)));
    }

    #[test]
    fn missing_device_is_a_bus_error() {
        let config = Config { address: 0x69, ..Config::default() };
        let mut mpu = Mpu60xx::new(device(), config);
        assert!(matches!(mpu.reset(&mut MockDelay::default()), Err(Error::I2c(_))));
    }

    #[test]
    fn converts_accelerometer() {
        assert_eq!(accel_to_g(2048, AccelRange::G16), 1 << 16);
        assert_eq!(accel_to_g(-1024, AccelRange::G16), -(1 << 15));
        assert_eq!(accel_to_g(16384, AccelRange::G2), 1 << 16);
    }

    #[test]
    fn converts_gyroscope() {
        // 16.4 LSB per °/s: 164 is 10 °/s = 0.17453 rad/s.
        let rad = gyro_to_rad(164, GyroRange::Dps2000);
        assert!((rad - 11_438).abs() <= 2, "{}", rad);
        assert_eq!(gyro_to_rad(0, GyroRange::Dps250), 0);
        assert!(gyro_to_rad(-131, GyroRange::Dps250) < 0);
    }

    #[test]
    fn converts_temperature() {
        assert_eq!(temperature_to_celsius(0), 9352);
        // 340 LSB per °C.
        assert_eq!(temperature_to_celsius(340), 9352 + 256);
        assert_eq!(temperature_to_celsius(-340), 9352 - 256);
    }

    #[test]
    fn measures_burst() {
        let mut i2c = device();
        let raw: [i16; 7] = [2048, 0, -2048, 340, 164, 0, 0];
        for (index, word) in raw.iter().enumerate() {
            let [high, low] = word.to_be_bytes();
            i2c.registers[usize::from(register::ACCEL_XOUT_H) + 2 * index] = high;
            i2c.registers[usize::from(register::ACCEL_XOUT_H) + 2 * index + 1] = low;
        }
        let mut mpu = Mpu60xx::new(i2c, Config::default());
        let measurement = mpu.measure().unwrap();
        assert_eq!(measurement.accel, [1 << 16, 0, -(1 << 16)]);
        assert_eq!(measurement.temperature, 9352 + 256);
        assert_eq!(measurement.gyro[1], 0);
    }
}
