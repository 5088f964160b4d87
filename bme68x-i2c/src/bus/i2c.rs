use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, Operation};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

#[cfg(feature = "linux-hal")]
use crate::config::BusEntry;
#[cfg(feature = "linux-hal")]
use crate::errors::{ConfigError, ConfigResult};

/// First address probed by a bus scan
pub const SCAN_ADDR_FIRST: u8 = 0x08;
/// Last address probed by a bus scan
pub const SCAN_ADDR_LAST: u8 = 0x77;

/// I2C bus error type
#[derive(Error, Debug)]
pub enum BusError<E: fmt::Debug> {
    #[error("I2C transaction failed: {0:?}")]
    Transaction(E),

    #[error("I2C bus lock poisoned")]
    Poisoned,
}

impl<E: i2c::Error> i2c::Error for BusError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            BusError::Transaction(e) => e.kind(),
            BusError::Poisoned => ErrorKind::Other,
        }
    }
}

/// I2C bus shared by every device attached to it
///
/// Transactions are serialized through an internal lock, so one bus can be
/// borrowed by several sensor handles at once.
pub struct I2cBus<B> {
    id: String,
    inner: Mutex<B>,
}

impl<B> I2cBus<B> {
    pub fn new(id: impl Into<String>, bus: B) -> Self {
        let id = id.into();
        debug!("[i2c_bus] {} created", id);
        Self { id, inner: Mutex::new(bus) }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Release the bus and hand back the underlying peripheral
    pub fn delete(self) -> B {
        info!("[i2c_bus] {} deleted", self.id);
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: I2c> I2cBus<B> {
    fn lock(&self) -> Result<MutexGuard<'_, B>, BusError<B::Error>> {
        self.inner.lock().map_err(|_| BusError::Poisoned)
    }

    /// Read `buf.len()` bytes starting at register `reg`
    pub fn read_bytes(&self, address: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError<B::Error>> {
        self.lock()?
            .write_read(address, &[reg], buf)
            .map_err(BusError::Transaction)
    }

    /// Write `data` starting at register `reg`
    pub fn write_bytes(&self, address: u8, reg: u8, data: &[u8]) -> Result<(), BusError<B::Error>> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(reg);
        frame.extend_from_slice(data);
        self.lock()?
            .write(address, &frame)
            .map_err(BusError::Transaction)
    }

    pub fn transaction(&self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), BusError<B::Error>> {
        self.lock()?
            .transaction(address, operations)
            .map_err(BusError::Transaction)
    }

    /// Whether a device acknowledges a one byte read at `address`
    pub fn probe(&self, address: u8) -> bool {
        let mut buf = [0u8; 1];
        match self.lock() {
            Ok(mut bus) => bus.read(address, &mut buf).is_ok(),
            Err(_) => false,
        }
    }

    /// Addresses in the 7-bit range that answered a probe
    pub fn scan(&self) -> Vec<u8> {
        let found: Vec<u8> = (SCAN_ADDR_FIRST..=SCAN_ADDR_LAST)
            .filter(|addr| self.probe(*addr))
            .collect();
        for addr in &found {
            debug!("[i2c_bus] {} found device at {:#04x}", self.id, addr);
        }
        found
    }

    /// Binding of this bus to a single device address
    pub fn device(&self, address: u8) -> I2cDevice<'_, B> {
        I2cDevice { bus: self, address }
    }
}

#[cfg(feature = "linux-hal")]
impl I2cBus<crate::hal::I2CDevice> {
    /// Open a Linux i2c-dev bus described by `entry`
    pub fn open(entry: &BusEntry) -> ConfigResult<Self> {
        if crate::bus::BusType::from_str(&entry.r#type).is_none() {
            return Err(ConfigError::UnsupportedBus {
                bus: entry.id.clone(),
                kind: entry.r#type.clone(),
            });
        }
        let device = crate::hal::I2CDevice::new(&entry.path).map_err(|e| ConfigError::LoadError {
            path: entry.path.clone(),
            source: std::io::Error::other(e),
        })?;
        info!("[i2c_bus] {} opened at {}", entry.id, entry.path);
        Ok(Self::new(entry.id.clone(), device))
    }
}

/// Register read/write binding of one device address on an [`I2cBus`]
///
/// This is what the sensor driver is given at bind time. It is a cheap
/// copyable reference; the bus itself stays owned by the caller.
pub struct I2cDevice<'a, B> {
    bus: &'a I2cBus<B>,
    address: u8,
}

impl<B> Clone for I2cDevice<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for I2cDevice<'_, B> {}

impl<B> fmt::Debug for I2cDevice<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("I2cDevice")
            .field("bus", &self.bus.id)
            .field("address", &format_args!("{:#04x}", self.address))
            .finish()
    }
}

impl<'a, B> I2cDevice<'a, B> {
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn bus(&self) -> &'a I2cBus<B> {
        self.bus
    }
}

impl<B: I2c> I2cDevice<'_, B> {
    pub fn read_regs(&self, reg: u8, buf: &mut [u8]) -> Result<(), BusError<B::Error>> {
        self.bus.read_bytes(self.address, reg, buf)
    }

    pub fn write_regs(&self, reg: u8, data: &[u8]) -> Result<(), BusError<B::Error>> {
        self.bus.write_bytes(self.address, reg, data)
    }
}

impl<B: I2c> ErrorType for I2cDevice<'_, B> {
    type Error = BusError<B::Error>;
}

impl<B: I2c> I2c for I2cDevice<'_, B> {
    fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock()?.read(address, read).map_err(BusError::Transaction)
    }

    fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock()?.write(address, write).map_err(BusError::Transaction)
    }

    fn write_read(&mut self, address: u8, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus
            .lock()?
            .write_read(address, write, read)
            .map_err(BusError::Transaction)
    }

    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        self.bus.transaction(address, operations)
    }
}

#[cfg(feature = "bme680-driver")]
mod hal02 {
    use super::{BusError, I2cDevice};
    use embedded_hal::i2c::I2c;
    use embedded_hal_0_2::blocking::i2c::{Read, Write, WriteRead};

    impl<B: I2c> Read for I2cDevice<'_, B> {
        type Error = BusError<B::Error>;

        fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
            I2c::read(self, address, buffer)
        }
    }

    impl<B: I2c> Write for I2cDevice<'_, B> {
        type Error = BusError<B::Error>;

        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
            I2c::write(self, address, bytes)
        }
    }

    impl<B: I2c> WriteRead for I2cDevice<'_, B> {
        type Error = BusError<B::Error>;

        fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
            I2c::write_read(self, address, bytes, buffer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::NoAcknowledgeSource;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    const ADDR: u8 = 0x77;

    #[test]
    fn read_bytes_writes_register_then_reads() {
        let expectations = [Transaction::write_read(ADDR, vec![0xD0], vec![0x61])];
        let bus = I2cBus::new("i2c0", I2cMock::new(&expectations));

        let mut buf = [0u8; 1];
        bus.read_bytes(ADDR, 0xD0, &mut buf).unwrap();
        assert_eq!(buf, [0x61]);

        bus.delete().done();
    }

    #[test]
    fn write_bytes_prefixes_register() {
        let expectations = [Transaction::write(ADDR, vec![0x74, 0x25, 0x01])];
        let bus = I2cBus::new("i2c0", I2cMock::new(&expectations));

        bus.write_bytes(ADDR, 0x74, &[0x25, 0x01]).unwrap();

        bus.delete().done();
    }

    #[test]
    fn transaction_error_is_reported() {
        let expectations = [Transaction::write_read(ADDR, vec![0xD0], vec![0x00]).with_error(ErrorKind::Bus)];
        let bus = I2cBus::new("i2c0", I2cMock::new(&expectations));

        let mut buf = [0u8; 1];
        let err = bus.read_bytes(ADDR, 0xD0, &mut buf).unwrap_err();
        assert!(matches!(err, BusError::Transaction(ErrorKind::Bus)));
        assert_eq!(i2c::Error::kind(&err), ErrorKind::Bus);

        bus.delete().done();
    }

    #[test]
    fn scan_reports_acknowledging_addresses() {
        let nack = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);
        let expectations: Vec<Transaction> = (SCAN_ADDR_FIRST..=SCAN_ADDR_LAST)
            .map(|addr| {
                let t = Transaction::read(addr, vec![0x00]);
                if addr == 0x76 || addr == 0x77 {
                    t
                } else {
                    t.with_error(nack)
                }
            })
            .collect();
        let bus = I2cBus::new("i2c0", I2cMock::new(&expectations));

        assert_eq!(bus.scan(), vec![0x76, 0x77]);

        bus.delete().done();
    }

    #[test]
    fn device_binds_address() {
        let expectations = [
            Transaction::write_read(0x76, vec![0xD0], vec![0x61]),
            Transaction::write(0x76, vec![0xE0, 0xB6]),
        ];
        let bus = I2cBus::new("i2c1", I2cMock::new(&expectations));
        let dev = bus.device(0x76);
        let copy = dev;

        let mut id = [0u8; 1];
        dev.read_regs(0xD0, &mut id).unwrap();
        copy.write_regs(0xE0, &[0xB6]).unwrap();

        assert_eq!(id[0], 0x61);
        assert_eq!(copy.address(), 0x76);
        assert_eq!(copy.bus().id(), "i2c1");
        assert_eq!(format!("{:?}", dev), "I2cDevice { bus: \"i2c1\", address: 0x76 }");

        bus.delete().done();
    }

    #[test]
    fn device_forwards_embedded_hal_calls() {
        let expectations = [Transaction::write(0x76, vec![0x73, 0x10])];
        let bus = I2cBus::new("i2c0", I2cMock::new(&expectations));
        let mut dev = bus.device(0x76);

        dev.write(0x76, &[0x73, 0x10]).unwrap();

        bus.delete().done();
    }
}
