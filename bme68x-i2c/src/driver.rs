/// Contract expected from the external BME68x sensor driver
///
/// The handle manager never talks to the sensor itself. It binds a transport
/// to whatever implements [`Bme68xApi`], runs the driver's initialization,
/// and hands the driver back to the application behind the sensor handle.

#[cfg(feature = "bme680-driver")]
pub mod bme680;

use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// I2C address with SDO strapped to GND
pub const BME68X_I2C_ADDR_LOW: u8 = 0x76;
/// I2C address with SDO strapped to VDDIO
pub const BME68X_I2C_ADDR_HIGH: u8 = 0x77;
/// Value of the chip id register (0xD0)
pub const BME68X_CHIP_ID: u8 = 0x61;

const NEW_DATA_MSK: u8 = 0x80;
const GASM_VALID_MSK: u8 = 0x20;
const HEAT_STAB_MSK: u8 = 0x10;

/// Status reported by the driver when an API call does not succeed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    #[error("Null pointer")]
    NullPtr,

    #[error("Communication failure")]
    ComFail,

    #[error("Device not found")]
    DevNotFound,

    #[error("Incorrect length parameter")]
    InvalidLength,

    #[error("Self test error")]
    SelfTest,

    #[error("Operating mode not supported")]
    DefineOpMode,
}

impl DriverError {
    /// Numeric status in the vendor library's convention
    pub fn code(self) -> i8 {
        match self {
            DriverError::NullPtr => -1,
            DriverError::ComFail => -2,
            DriverError::DevNotFound => -3,
            DriverError::InvalidLength => -4,
            DriverError::SelfTest => -5,
            DriverError::DefineOpMode => 1,
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Log a driver status for `api_name`; success is silent
pub fn check_rslt<T>(api_name: &str, rslt: &DriverResult<T>) {
    if let Err(e) = rslt {
        error!("[bme68x] API name [{}]  Error [{}] : {}", api_name, e.code(), e);
    }
}

/// Physical interface the driver is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interface {
    Spi,
    #[default]
    I2c,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpMode {
    #[default]
    Sleep,
    Forced,
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversampling {
    None,
    #[default]
    X1,
    X2,
    X4,
    X8,
    X16,
}

/// IIR filter coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Off,
    Size1,
    Size3,
    Size7,
    Size15,
    Size31,
    Size63,
    Size127,
}

/// Standby time between sequential mode measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Odr {
    Ms0_59,
    Ms62_5,
    Ms125,
    Ms250,
    Ms500,
    Ms1000,
    Ms10,
    Ms20,
    #[default]
    None,
}

/// Oversampling, filter and standby configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Conf {
    pub os_hum: Oversampling,
    pub os_temp: Oversampling,
    pub os_pres: Oversampling,
    pub filter: Filter,
    pub odr: Odr,
}

/// Gas sensor heater profile for forced mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeatrConf {
    pub enable: bool,
    /// Target temperature in degrees Celsius
    pub heatr_temp: u16,
    /// Heating duration in milliseconds
    pub heatr_dur: u16,
}

/// One set of compensated measurement fields
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldData {
    pub status: u8,
    /// Degrees Celsius
    pub temperature: f32,
    /// Pascal
    pub pressure: f32,
    /// Relative humidity in percent
    pub humidity: f32,
    /// Ohm
    pub gas_resistance: f32,
}

impl FieldData {
    pub fn is_new_data(&self) -> bool {
        self.status & NEW_DATA_MSK != 0
    }

    pub fn gas_valid(&self) -> bool {
        self.status & GASM_VALID_MSK != 0
    }

    pub fn heat_stable(&self) -> bool {
        self.status & HEAT_STAB_MSK != 0
    }
}

/// Status flags for a field set built from individual conditions
pub fn field_status(new_data: bool, gas_valid: bool, heat_stable: bool) -> u8 {
    let mut status = 0;
    if new_data {
        status |= NEW_DATA_MSK;
    }
    if gas_valid {
        status |= GASM_VALID_MSK;
    }
    if heat_stable {
        status |= HEAT_STAB_MSK;
    }
    status
}

/// Operations of the external sensor driver
///
/// `Default` must produce the zeroed driver state the handle manager
/// allocates before binding. `interface_init` and `init` are called by the
/// manager; everything else is for the application, reached through the
/// sensor handle.
pub trait Bme68xApi: Default {
    /// Transport the driver issues register reads and writes through
    type Transport;

    fn interface_init(&mut self, intf: Interface, addr: u8, transport: Self::Transport) -> DriverResult<()>;
    fn init(&mut self) -> DriverResult<()>;
    fn selftest_check(&mut self) -> DriverResult<()>;
    fn set_conf(&mut self, conf: &Conf) -> DriverResult<()>;
    fn set_heatr_conf(&mut self, mode: OpMode, conf: &HeatrConf) -> DriverResult<()>;
    fn set_op_mode(&mut self, mode: OpMode) -> DriverResult<()>;
    fn get_op_mode(&mut self) -> DriverResult<OpMode>;
    /// Duration of one TPHG measurement cycle in `mode` under `conf`
    fn get_meas_dur(&mut self, mode: OpMode, conf: &Conf) -> DriverResult<Duration>;
    /// Fetch the field sets for `mode`; empty when no new data is available
    fn get_data(&mut self, mode: OpMode) -> DriverResult<Vec<FieldData>>;
}
