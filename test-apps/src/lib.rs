/// Smoke tests for a BME68x on a Linux I2C bus
///
/// - `scan`: list the devices answering on the bus
/// - `selftest`: create the sensor and run the driver self test
/// - `sample`: forced mode measurements printed as JSON lines
///
/// Each run snapshots the heap on setup and checks it again on teardown.

pub mod apps;
pub mod context;
pub mod errors;
pub mod heap;

pub use apps::{bus_scan, run_self_test, sample, sample_forced, sampling_loop, self_test, Command, SampleRecord};
pub use context::TestContext;
pub use errors::{AppError, AppResult};
pub use heap::{check_leak, live_bytes, CountingAlloc, TEST_MEMORY_LEAK_THRESHOLD};

/// Default configuration directory (embedded at compile time)
pub const CONFIG_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config");

/// Embedded TOML configurations
pub const BUSES_TOML: &str = include_str!("../config/buses.toml");
pub const SENSORS_TOML: &str = include_str!("../config/sensors.toml");

pub const APP_NAME: &str = "BME68X TEST";

/// Get the configuration path (allow override via CONFIG_PATH env var)
pub fn get_config_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| CONFIG_DIR.to_string())
}

/// Sensor entry id to use (BME68X_SENSOR env var), first BME68x entry if unset
pub fn get_sensor_id() -> Option<String> {
    std::env::var("BME68X_SENSOR").ok()
}

/// Number of samples to take (BME68X_SAMPLES env var), unbounded if unset
pub fn get_max_samples() -> AppResult<Option<u64>> {
    match std::env::var("BME68X_SAMPLES") {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| AppError::InvalidArgument { name: "BME68X_SAMPLES", value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bme68x_i2c::{BusConfig, SensorConfig};

    #[test]
    fn embedded_configs_parse() {
        let buses = BusConfig::from_toml(BUSES_TOML).unwrap();
        let sensors = SensorConfig::from_toml(SENSORS_TOML).unwrap();

        let sensor = sensors.find(None).unwrap();
        let bus = buses.find(&sensor.bus).unwrap();
        assert_eq!(bus.r#type, "i2c");
        assert_eq!(sensor.i2c_addr(), bme68x_i2c::BME68X_I2C_ADDR_HIGH);
        assert!(sensor.measurement.conf().is_ok());
        assert!(sensor.measurement.heatr_conf().is_ok());
    }
}
