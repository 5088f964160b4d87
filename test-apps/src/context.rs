use crate::errors::AppResult;
use crate::heap::{check_leak, live_bytes};
use bme68x_i2c::{Bme68xApi, Bme68xHandle, Bme68xI2cConfig, I2cBus, I2cDevice, SensorEntry, SensorResult};
use embedded_hal::i2c::I2c;
use tracing::info;

/// Per-run state: the bus, the sensor entry under test and the heap
/// snapshot taken on setup
pub struct TestContext<B> {
    bus: I2cBus<B>,
    sensor: SensorEntry,
    heap_before: isize,
}

impl<B> TestContext<B> {
    /// Setup around an already opened bus
    ///
    /// The heap snapshot is taken before the bus is handed over, so the
    /// caller should create it right before this call.
    pub fn with_bus(bus: I2cBus<B>, sensor: SensorEntry, heap_before: isize) -> Self {
        Self { bus, sensor, heap_before }
    }

    pub fn bus(&self) -> &I2cBus<B> {
        &self.bus
    }

    pub fn sensor(&self) -> &SensorEntry {
        &self.sensor
    }

    pub fn i2c_config(&self) -> Bme68xI2cConfig<'_, B> {
        Bme68xI2cConfig {
            i2c_handle: Some(&self.bus),
            i2c_addr: self.sensor.i2c_addr(),
        }
    }

    /// Release the bus and check the heap against the setup snapshot
    ///
    /// The bus peripheral is handed back to the caller.
    pub fn teardown(self) -> AppResult<B> {
        let Self { bus, sensor, heap_before } = self;
        let id = bus.id().to_string();
        let device = bus.delete();
        drop(sensor);
        info!("[test_app] {} released", id);
        check_leak(heap_before, live_bytes(), "default")?;
        Ok(device)
    }
}

impl<B: I2c> TestContext<B> {
    pub fn create_sensor<'a, D>(&'a self) -> SensorResult<Bme68xHandle<'a, B, D>>
    where
        D: Bme68xApi<Transport = I2cDevice<'a, B>>,
    {
        Bme68xHandle::create(&self.i2c_config())
    }
}

impl TestContext<bme68x_i2c::hal::I2CDevice> {
    /// Load both config files under `config_path` and open the sensor's bus
    pub fn setup(config_path: &str, sensor_id: Option<&str>) -> AppResult<Self> {
        let heap_before = live_bytes();

        let sensors = bme68x_i2c::load_sensor_config(&format!("{}/sensors.toml", config_path))?;
        let buses = bme68x_i2c::load_bus_config(&format!("{}/buses.toml", config_path))?;
        let sensor = sensors.find(sensor_id)?.clone();
        let bus_entry = buses.find(&sensor.bus)?;

        info!(
            "[test_app] {} at {:#04x} on {} ({})",
            sensor.id,
            sensor.i2c_addr(),
            bus_entry.id,
            bus_entry.path
        );
        let bus = I2cBus::open(bus_entry)?;
        drop(sensors);
        drop(buses);

        Ok(Self::with_bus(bus, sensor, heap_before))
    }
}
