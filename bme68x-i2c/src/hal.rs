/// Hardware Abstraction Layer (HAL) for platform-agnostic sensor access
///
/// Platform I2C types are re-exported from here, together with the blocking
/// delay the sensor driver uses between register accesses.

use std::thread;
use std::time::Duration;

#[cfg(feature = "linux-hal")]
pub mod linux {
    // Re-export linux-embedded-hal types directly
    pub use linux_embedded_hal::I2cdev as I2CDevice;
}

// Re-export the active platform's HAL
#[cfg(feature = "linux-hal")]
pub use linux::*;

/// Delay that blocks the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl embedded_hal::delay::DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

#[cfg(feature = "bme680-driver")]
impl embedded_hal_0_2::blocking::delay::DelayMs<u8> for StdDelay {
    fn delay_ms(&mut self, ms: u8) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}
