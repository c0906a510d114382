//! Device drivers built on the `embedded-hal` 1.0 traits.
//!
//! Each driver owns its bus handle (an `SpiDevice`, `I2c` or pin) and hands it
//! back through `release`.

pub mod ds18b20;
pub mod mpu60xx;
pub mod onewire;
pub mod st7735;
pub mod w25;
pub mod xpt2046;
