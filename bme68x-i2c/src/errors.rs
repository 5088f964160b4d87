use thiserror::Error;
use crate::driver::DriverError;

/// Success status in the component status-code convention
pub const ESP_OK: i32 = 0;
/// Out of memory
pub const ESP_ERR_NO_MEM: i32 = 0x101;
/// Invalid argument
pub const ESP_ERR_INVALID_ARG: i32 = 0x102;
/// Invalid state
pub const ESP_ERR_INVALID_STATE: i32 = 0x103;

/// Errors reported by sensor handle creation and deletion
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Invalid argument: {reason}")]
    InvalidArg { reason: &'static str },

    #[error("Memory allocation for device handler failed")]
    NoMem,

    #[error("{api} failed: {source}")]
    InvalidState {
        api: &'static str,
        #[source]
        source: DriverError,
    },
}

impl SensorError {
    /// Status code of this error, zero being reserved for success
    pub fn code(&self) -> i32 {
        match self {
            SensorError::InvalidArg { .. } => ESP_ERR_INVALID_ARG,
            SensorError::NoMem => ESP_ERR_NO_MEM,
            SensorError::InvalidState { .. } => ESP_ERR_INVALID_STATE,
        }
    }
}

/// Collapse a result into its status code
pub fn status_code<T>(result: &SensorResult<T>) -> i32 {
    match result {
        Ok(_) => ESP_OK,
        Err(e) => e.code(),
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration format: {0}")]
    FormatError(#[from] toml::de::Error),

    #[error("Sensor '{id}' not found in configuration")]
    SensorNotFound { id: String },

    #[error("Bus '{bus}' not found or unavailable")]
    BusNotFound { bus: String },

    #[error("Unsupported sensor driver: '{driver}'")]
    UnsupportedDriver { driver: String },

    #[error("Unsupported bus type '{kind}' for bus '{bus}'")]
    UnsupportedBus { bus: String, kind: String },

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type aliases for convenience
pub type SensorResult<T> = Result<T, SensorError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
