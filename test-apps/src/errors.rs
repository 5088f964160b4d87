use bme68x_i2c::{ConfigError, DriverError, SensorError};
use thiserror::Error;

/// Errors of the test applications
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error("{api} failed: {source}")]
    Driver {
        api: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("Memory leak in {kind} heap: delta {delta} bytes")]
    Leak { kind: &'static str, delta: isize },

    #[error("Failed to serialize sample: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Failed to write sample: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value '{value}' for {name}")]
    InvalidArgument { name: &'static str, value: String },
}

pub type AppResult<T> = Result<T, AppError>;
