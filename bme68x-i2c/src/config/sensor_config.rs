use crate::driver::{Conf, Filter, HeatrConf, Odr, Oversampling, BME68X_I2C_ADDR_HIGH, BME68X_I2C_ADDR_LOW};
use crate::errors::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Driver name accepted in `[[sensor]]` entries
pub const BME68X_DRIVER: &str = "bme68x";

const MAX_HEATER_TEMP_C: u16 = 400;
const MAX_HEATER_DUR_MS: u16 = 4032;
const DEFAULT_FREQUENCY_HZ: u32 = 1;

/// Root configuration struct expecting `[[sensor]]` TOML array format
#[derive(Debug, Deserialize)]
pub struct SensorConfig {
    #[serde(rename = "sensor")]
    pub sensors: Vec<SensorEntry>,
}

/// One sensor entry, matching each `[[sensor]]` section
#[derive(Debug, Clone, Deserialize)]
pub struct SensorEntry {
    pub id: String,
    pub driver: String,
    pub bus: String,
    /// Explicit address; overrides the SDO strap
    pub address: Option<u8>,
    /// SDO pin strapped to GND
    #[serde(default)]
    pub sdo_pulled_down: bool,
    /// Sampling frequency in Hz
    pub frequency: Option<u32>,
    #[serde(default)]
    pub measurement: MeasurementConfig,
}

impl SensorEntry {
    pub fn i2c_addr(&self) -> u8 {
        match self.address {
            Some(addr) => addr,
            None if self.sdo_pulled_down => BME68X_I2C_ADDR_LOW,
            None => BME68X_I2C_ADDR_HIGH,
        }
    }

    pub fn sample_period(&self) -> Duration {
        let hz = self.frequency.filter(|f| *f > 0).unwrap_or(DEFAULT_FREQUENCY_HZ);
        Duration::from_secs_f64(1.0 / hz as f64)
    }
}

/// Forced mode measurement settings of a sensor entry
///
/// Oversampling values are the factor (0 skips the measurement), the
/// filter value is the IIR coefficient.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub os_hum: u8,
    pub os_temp: u8,
    pub os_pres: u8,
    pub filter: u8,
    pub heater_enable: bool,
    pub heater_temp_c: u16,
    pub heater_dur_ms: u16,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            os_hum: 16,
            os_temp: 2,
            os_pres: 1,
            filter: 0,
            heater_enable: true,
            heater_temp_c: 300,
            heater_dur_ms: 100,
        }
    }
}

fn oversampling(field: &str, factor: u8) -> ConfigResult<Oversampling> {
    match factor {
        0 => Ok(Oversampling::None),
        1 => Ok(Oversampling::X1),
        2 => Ok(Oversampling::X2),
        4 => Ok(Oversampling::X4),
        8 => Ok(Oversampling::X8),
        16 => Ok(Oversampling::X16),
        other => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("oversampling factor {} is not one of 0, 1, 2, 4, 8, 16", other),
        }),
    }
}

fn filter(coeff: u8) -> ConfigResult<Filter> {
    match coeff {
        0 => Ok(Filter::Off),
        1 => Ok(Filter::Size1),
        3 => Ok(Filter::Size3),
        7 => Ok(Filter::Size7),
        15 => Ok(Filter::Size15),
        31 => Ok(Filter::Size31),
        63 => Ok(Filter::Size63),
        127 => Ok(Filter::Size127),
        other => Err(ConfigError::InvalidValue {
            field: "filter".to_string(),
            reason: format!("filter coefficient {} is not one of 0, 1, 3, 7, 15, 31, 63, 127", other),
        }),
    }
}

impl MeasurementConfig {
    pub fn conf(&self) -> ConfigResult<Conf> {
        Ok(Conf {
            os_hum: oversampling("os_hum", self.os_hum)?,
            os_temp: oversampling("os_temp", self.os_temp)?,
            os_pres: oversampling("os_pres", self.os_pres)?,
            filter: filter(self.filter)?,
            odr: Odr::None,
        })
    }

    pub fn heatr_conf(&self) -> ConfigResult<HeatrConf> {
        if self.heater_temp_c > MAX_HEATER_TEMP_C {
            return Err(ConfigError::InvalidValue {
                field: "heater_temp_c".to_string(),
                reason: format!("{} exceeds {} degrees", self.heater_temp_c, MAX_HEATER_TEMP_C),
            });
        }
        if self.heater_dur_ms > MAX_HEATER_DUR_MS {
            return Err(ConfigError::InvalidValue {
                field: "heater_dur_ms".to_string(),
                reason: format!("{} exceeds {} ms", self.heater_dur_ms, MAX_HEATER_DUR_MS),
            });
        }
        Ok(HeatrConf {
            enable: self.heater_enable,
            heatr_temp: self.heater_temp_c,
            heatr_dur: self.heater_dur_ms,
        })
    }
}

impl SensorConfig {
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Sensor entry named `id`, or the first BME68x entry when `id` is `None`
    pub fn find(&self, id: Option<&str>) -> ConfigResult<&SensorEntry> {
        let entry = match id {
            Some(id) => self
                .sensors
                .iter()
                .find(|s| s.id == id)
                .ok_or_else(|| ConfigError::SensorNotFound { id: id.to_string() })?,
            None => self
                .sensors
                .iter()
                .find(|s| s.driver == BME68X_DRIVER)
                .ok_or_else(|| ConfigError::SensorNotFound { id: BME68X_DRIVER.to_string() })?,
        };
        if entry.driver != BME68X_DRIVER {
            return Err(ConfigError::UnsupportedDriver { driver: entry.driver.clone() });
        }
        Ok(entry)
    }
}

/// Loads config from TOML file
pub fn load_sensor_config(path: &str) -> ConfigResult<SensorConfig> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadError {
        path: path.to_string(),
        source: e,
    })?;
    SensorConfig::from_toml(&content)
}
