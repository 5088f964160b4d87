// Public modules
pub mod bus;
pub mod config;
pub mod driver;
pub mod errors;
pub mod hal;
pub mod sensor;

// Re-export commonly used types
pub use bus::{I2cBus, I2cDevice};
pub use config::{load_bus_config, load_sensor_config, BusConfig, SensorConfig, SensorEntry};
pub use driver::{Bme68xApi, DriverError, DriverResult, BME68X_I2C_ADDR_HIGH, BME68X_I2C_ADDR_LOW};
pub use errors::{ConfigError, ConfigResult, SensorError, SensorResult};
pub use sensor::{sensor_create, sensor_del, Bme68xHandle, Bme68xI2cConfig};

#[cfg(feature = "bme680-driver")]
pub use driver::bme680::Bme680Driver;

use tracing_subscriber::EnvFilter;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}
