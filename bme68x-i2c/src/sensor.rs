/// BME68x sensor handle over an I2C bus
///
/// [`Bme68xHandle::create`] allocates the sensor context, binds it to the
/// bus and address, and runs the driver's initialization. Any failure frees
/// the context before returning, so a handle always refers to an
/// initialized sensor. Once created, the handle dereferences to the driver
/// and every further sensor operation goes straight to it.

use crate::bus::{I2cBus, I2cDevice};
use crate::driver::{check_rslt, Bme68xApi, Interface};
use crate::errors::{SensorError, SensorResult};
use embedded_hal::i2c::I2c;
use std::fmt;
use std::ops::{Deref, DerefMut};
use tracing::{debug, error, info};

/// I2C parameters of a sensor handle
pub struct Bme68xI2cConfig<'a, B> {
    /// Bus the sensor is attached to; must outlive the handle
    pub i2c_handle: Option<&'a I2cBus<B>>,
    /// Device address, selected by the SDO strap
    pub i2c_addr: u8,
}

struct Bme68xDev<'a, B, D> {
    transport: I2cDevice<'a, B>,
    intf: Interface,
    driver: D,
}

/// Owned handle to an initialized sensor
///
/// Deleting consumes the handle. The bus it was created on is borrowed, not
/// owned, and is left untouched.
pub struct Bme68xHandle<'a, B, D> {
    dev: Box<[Bme68xDev<'a, B, D>; 1]>,
}

/// Move `value` to the heap, reporting allocation failure instead of aborting
fn try_box<T>(value: T) -> SensorResult<Box<[T; 1]>> {
    let mut slot = Vec::new();
    slot.try_reserve_exact(1).map_err(|_| SensorError::NoMem)?;
    slot.push(value);
    slot.into_boxed_slice().try_into().map_err(|_| SensorError::NoMem)
}

impl<'a, B, D> Bme68xHandle<'a, B, D>
where
    B: I2c,
    D: Bme68xApi<Transport = I2cDevice<'a, B>>,
{
    /// Create and initialize a sensor on `conf.i2c_handle` at `conf.i2c_addr`
    pub fn create(conf: &Bme68xI2cConfig<'a, B>) -> SensorResult<Self> {
        let bus = conf.i2c_handle.ok_or_else(|| {
            error!("[bme68x] invalid i2c handle pointer");
            SensorError::InvalidArg { reason: "i2c handle is null" }
        })?;

        let transport = bus.device(conf.i2c_addr);
        let mut slot = try_box(Bme68xDev {
            transport,
            intf: Interface::I2c,
            driver: D::default(),
        })
        .map_err(|e| {
            error!("[bme68x] memory allocation for device handler failed");
            e
        })?;
        let dev = &mut slot[0];

        let intf = dev.intf;
        let rslt = dev.driver.interface_init(intf, conf.i2c_addr, transport);
        check_rslt("bme68x_sensor_create", &rslt);
        debug!("[bme68x] bme68x_check_rslt done");
        if let Err(source) = rslt {
            error!("[bme68x] bme68x_interface_init failed");
            return Err(SensorError::InvalidState { api: "bme68x_interface_init", source });
        }

        let rslt = dev.driver.init();
        check_rslt("bme68x_init", &rslt);
        if let Err(source) = rslt {
            error!("[bme68x] bme68x_init failed");
            return Err(SensorError::InvalidState { api: "bme68x_init", source });
        }

        info!("[bme68x] Create {:<15} on {} at {:#04x}", "BME68x", bus.id(), conf.i2c_addr);
        Ok(Self { dev: slot })
    }
}

impl<'a, B, D> Bme68xHandle<'a, B, D> {
    /// Release the sensor context
    pub fn delete(self) -> SensorResult<()> {
        drop(self);
        Ok(())
    }

    pub fn address(&self) -> u8 {
        self.dev[0].transport.address()
    }

    pub fn interface(&self) -> Interface {
        self.dev[0].intf
    }

    /// Bus binding the driver was given
    pub fn transport(&self) -> I2cDevice<'a, B> {
        self.dev[0].transport
    }

    pub fn driver(&self) -> &D {
        &self.dev[0].driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.dev[0].driver
    }
}

impl<B, D> Deref for Bme68xHandle<'_, B, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.dev[0].driver
    }
}

impl<B, D> DerefMut for Bme68xHandle<'_, B, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.dev[0].driver
    }
}

impl<B, D> Drop for Bme68xHandle<'_, B, D> {
    fn drop(&mut self) {
        debug!("[bme68x] sensor at {:#04x} released", self.dev[0].transport.address());
    }
}

impl<B, D> fmt::Debug for Bme68xHandle<'_, B, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bme68xHandle")
            .field("transport", &self.dev[0].transport)
            .field("intf", &self.dev[0].intf)
            .finish_non_exhaustive()
    }
}

/// Create and initialize a sensor, see [`Bme68xHandle::create`]
pub fn sensor_create<'a, B, D>(conf: &Bme68xI2cConfig<'a, B>) -> SensorResult<Bme68xHandle<'a, B, D>>
where
    B: I2c,
    D: Bme68xApi<Transport = I2cDevice<'a, B>>,
{
    Bme68xHandle::create(conf)
}

/// Delete a sensor handle; a missing handle is an invalid argument
pub fn sensor_del<B, D>(handle: Option<Bme68xHandle<'_, B, D>>) -> SensorResult<()> {
    match handle {
        Some(handle) => handle.delete(),
        None => {
            error!("[bme68x] invalid device handle pointer");
            Err(SensorError::InvalidArg { reason: "device handle is null" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Conf, DriverError, DriverResult, FieldData, HeatrConf, OpMode, BME68X_CHIP_ID};
    use crate::errors::{status_code, ESP_ERR_INVALID_ARG, ESP_ERR_INVALID_STATE, ESP_OK};
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};
    use std::cell::Cell;
    use std::time::Duration;

    const ADDR: u8 = 0x77;
    const REG_CHIP_ID: u8 = 0xD0;

    thread_local! {
        static INIT_CALLS: Cell<usize> = const { Cell::new(0) };
    }

    /// Driver double whose bind and init outcome is fixed by its type
    #[derive(Default)]
    struct ScriptedDriver<'a, const BIND_OK: bool, const INIT_OK: bool> {
        bound: Option<(Interface, u8)>,
        transport: Option<I2cDevice<'a, I2cMock>>,
        initialized: bool,
        mode: OpMode,
    }

    impl<'a, const BIND_OK: bool, const INIT_OK: bool> Bme68xApi for ScriptedDriver<'a, BIND_OK, INIT_OK> {
        type Transport = I2cDevice<'a, I2cMock>;

        fn interface_init(&mut self, intf: Interface, addr: u8, transport: Self::Transport) -> DriverResult<()> {
            if !BIND_OK {
                return Err(DriverError::NullPtr);
            }
            self.bound = Some((intf, addr));
            self.transport = Some(transport);
            Ok(())
        }

        fn init(&mut self) -> DriverResult<()> {
            INIT_CALLS.with(|c| c.set(c.get() + 1));
            if !INIT_OK {
                return Err(DriverError::DevNotFound);
            }
            self.initialized = true;
            Ok(())
        }

        fn selftest_check(&mut self) -> DriverResult<()> {
            Ok(())
        }

        fn set_conf(&mut self, _conf: &Conf) -> DriverResult<()> {
            Ok(())
        }

        fn set_heatr_conf(&mut self, _mode: OpMode, _conf: &HeatrConf) -> DriverResult<()> {
            Ok(())
        }

        fn set_op_mode(&mut self, mode: OpMode) -> DriverResult<()> {
            self.mode = mode;
            Ok(())
        }

        fn get_op_mode(&mut self) -> DriverResult<OpMode> {
            Ok(self.mode)
        }

        fn get_meas_dur(&mut self, _mode: OpMode, _conf: &Conf) -> DriverResult<Duration> {
            Ok(Duration::from_millis(10))
        }

        fn get_data(&mut self, _mode: OpMode) -> DriverResult<Vec<FieldData>> {
            Ok(Vec::new())
        }
    }

    type Healthy<'a> = ScriptedDriver<'a, true, true>;
    type BindFails<'a> = ScriptedDriver<'a, false, true>;
    type InitFails<'a> = ScriptedDriver<'a, true, false>;

    /// Driver double that checks the chip id through its transport
    #[derive(Default)]
    struct ChipIdDriver<'a> {
        transport: Option<I2cDevice<'a, I2cMock>>,
    }

    impl<'a> Bme68xApi for ChipIdDriver<'a> {
        type Transport = I2cDevice<'a, I2cMock>;

        fn interface_init(&mut self, intf: Interface, _addr: u8, transport: Self::Transport) -> DriverResult<()> {
            if intf != Interface::I2c {
                return Err(DriverError::ComFail);
            }
            self.transport = Some(transport);
            Ok(())
        }

        fn init(&mut self) -> DriverResult<()> {
            let transport = self.transport.ok_or(DriverError::NullPtr)?;
            let mut id = [0u8; 1];
            transport.read_regs(REG_CHIP_ID, &mut id).map_err(|_| DriverError::ComFail)?;
            if id[0] != BME68X_CHIP_ID {
                return Err(DriverError::DevNotFound);
            }
            Ok(())
        }

        fn selftest_check(&mut self) -> DriverResult<()> {
            Err(DriverError::SelfTest)
        }

        fn set_conf(&mut self, _conf: &Conf) -> DriverResult<()> {
            Ok(())
        }

        fn set_heatr_conf(&mut self, _mode: OpMode, _conf: &HeatrConf) -> DriverResult<()> {
            Ok(())
        }

        fn set_op_mode(&mut self, _mode: OpMode) -> DriverResult<()> {
            Ok(())
        }

        fn get_op_mode(&mut self) -> DriverResult<OpMode> {
            Ok(OpMode::Sleep)
        }

        fn get_meas_dur(&mut self, _mode: OpMode, _conf: &Conf) -> DriverResult<Duration> {
            Ok(Duration::ZERO)
        }

        fn get_data(&mut self, _mode: OpMode) -> DriverResult<Vec<FieldData>> {
            Ok(Vec::new())
        }
    }

    fn init_calls() -> usize {
        INIT_CALLS.with(Cell::get)
    }

    #[test]
    fn create_binds_transport_and_address() {
        let bus = I2cBus::new("i2c0", I2cMock::new(&[]));
        let conf = Bme68xI2cConfig { i2c_handle: Some(&bus), i2c_addr: ADDR };

        let handle = Bme68xHandle::<_, Healthy>::create(&conf).unwrap();

        assert_eq!(handle.address(), ADDR);
        assert_eq!(handle.interface(), Interface::I2c);
        assert_eq!(handle.transport().bus().id(), "i2c0");
        assert_eq!(handle.bound, Some((Interface::I2c, ADDR)));
        assert_eq!(handle.transport.map(|t| t.address()), Some(ADDR));
        assert!(handle.initialized);

        assert!(handle.delete().is_ok());
        bus.delete().done();
    }

    #[test]
    fn handle_derefs_to_driver() {
        let bus = I2cBus::new("i2c0", I2cMock::new(&[]));
        let conf = Bme68xI2cConfig { i2c_handle: Some(&bus), i2c_addr: ADDR };
        let mut handle = sensor_create::<_, Healthy>(&conf).unwrap();

        handle.set_op_mode(OpMode::Forced).unwrap();
        assert_eq!(handle.get_op_mode().unwrap(), OpMode::Forced);
        assert_eq!(handle.driver().mode, OpMode::Forced);
        handle.driver_mut().mode = OpMode::Sleep;
        assert_eq!(handle.get_op_mode().unwrap(), OpMode::Sleep);

        assert_eq!(status_code(&sensor_del(Some(handle))), ESP_OK);
        bus.delete().done();
    }

    #[test]
    fn null_transport_is_invalid_arg() {
        let conf: Bme68xI2cConfig<'_, I2cMock> = Bme68xI2cConfig { i2c_handle: None, i2c_addr: ADDR };
        let before = init_calls();

        let err = Bme68xHandle::<_, Healthy>::create(&conf).unwrap_err();

        assert!(matches!(err, SensorError::InvalidArg { .. }));
        assert_eq!(err.code(), ESP_ERR_INVALID_ARG);
        assert_eq!(init_calls(), before);
    }

    #[test]
    fn bind_failure_is_invalid_state_and_skips_init() {
        let bus = I2cBus::new("i2c0", I2cMock::new(&[]));
        let conf = Bme68xI2cConfig { i2c_handle: Some(&bus), i2c_addr: ADDR };
        let before = init_calls();

        let err = Bme68xHandle::<_, BindFails>::create(&conf).unwrap_err();

        match err {
            SensorError::InvalidState { api, source } => {
                assert_eq!(api, "bme68x_interface_init");
                assert_eq!(source, DriverError::NullPtr);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(init_calls(), before);
        bus.delete().done();
    }

    #[test]
    fn init_failure_is_invalid_state() {
        let bus = I2cBus::new("i2c0", I2cMock::new(&[]));
        let conf = Bme68xI2cConfig { i2c_handle: Some(&bus), i2c_addr: ADDR };
        let before = init_calls();

        let result = Bme68xHandle::<_, InitFails>::create(&conf).map(|_| ());

        assert_eq!(status_code(&result), ESP_ERR_INVALID_STATE);
        assert!(matches!(
            result,
            Err(SensorError::InvalidState { api: "bme68x_init", source: DriverError::DevNotFound })
        ));
        assert_eq!(init_calls(), before + 1);
        bus.delete().done();
    }

    #[test]
    fn delete_of_missing_handle_is_invalid_arg() {
        let err = sensor_del::<I2cMock, Healthy>(None).unwrap_err();
        assert_eq!(err.code(), ESP_ERR_INVALID_ARG);
    }

    #[test]
    fn driver_reads_chip_id_at_bound_address() {
        let expectations = [Transaction::write_read(0x76, vec![REG_CHIP_ID], vec![BME68X_CHIP_ID])];
        let bus = I2cBus::new("i2c0", I2cMock::new(&expectations));
        let conf = Bme68xI2cConfig { i2c_handle: Some(&bus), i2c_addr: 0x76 };

        let mut handle = Bme68xHandle::<_, ChipIdDriver>::create(&conf).unwrap();
        assert_eq!(handle.selftest_check(), Err(DriverError::SelfTest));
        sensor_del(Some(handle)).unwrap();

        bus.delete().done();
    }

    #[test]
    fn wrong_chip_id_fails_create() {
        let expectations = [Transaction::write_read(ADDR, vec![REG_CHIP_ID], vec![0x58])];
        let bus = I2cBus::new("i2c0", I2cMock::new(&expectations));
        let conf = Bme68xI2cConfig { i2c_handle: Some(&bus), i2c_addr: ADDR };

        let err = Bme68xHandle::<_, ChipIdDriver>::create(&conf).unwrap_err();
        assert!(matches!(err, SensorError::InvalidState { source: DriverError::DevNotFound, .. }));

        bus.delete().done();
    }

    #[test]
    fn bus_outlives_several_handles() {
        let bus = I2cBus::new("i2c0", I2cMock::new(&[]));
        let low = Bme68xI2cConfig { i2c_handle: Some(&bus), i2c_addr: 0x76 };
        let high = Bme68xI2cConfig { i2c_handle: Some(&bus), i2c_addr: 0x77 };

        let a = Bme68xHandle::<_, Healthy>::create(&low).unwrap();
        let b = Bme68xHandle::<_, Healthy>::create(&high).unwrap();
        assert_eq!((a.address(), b.address()), (0x76, 0x77));
        assert!(format!("{:?}", a).starts_with("Bme68xHandle"));

        drop(a);
        b.delete().unwrap();
        bus.delete().done();
    }
}
