/// [`Bme68xApi`] on top of the `bme680` embedded-hal driver crate
///
/// The crate talks to the sensor through the embedded-hal 0.2 blocking I2C
/// traits, which [`I2cDevice`] implements when this feature is enabled.
/// Configuration calls are accumulated and applied as one settings block,
/// the way the crate expects them.

use super::{
    field_status, Bme68xApi, Conf, DriverError, DriverResult, FieldData, Filter, HeatrConf, Interface, OpMode,
    Oversampling, BME68X_I2C_ADDR_HIGH, BME68X_I2C_ADDR_LOW,
};
use crate::bus::I2cDevice;
use crate::hal::StdDelay;
use bme680::{
    Bme680, FieldDataCondition, I2CAddress, IIRFilterSize, OversamplingSetting, PowerMode, Settings, SettingsBuilder,
};
use embedded_hal::i2c::I2c;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const SELFTEST_HOT_TEMP: u16 = 350;
const SELFTEST_HOT_DUR: u16 = 1000;
const SELFTEST_COLD_TEMP: u16 = 150;
const SELFTEST_COLD_DUR: u16 = 2000;

const MIN_TEMPERATURE: f32 = 0.0;
const MAX_TEMPERATURE: f32 = 60.0;
const MIN_PRESSURE: f32 = 90_000.0;
const MAX_PRESSURE: f32 = 110_000.0;
const MIN_HUMIDITY: f32 = 20.0;
const MAX_HUMIDITY: f32 = 80.0;

const DEFAULT_AMBIENT_TEMP: i8 = 25;

pub struct Bme680Driver<'a, B>
where
    B: I2c,
{
    addr: u8,
    transport: Option<I2cDevice<'a, B>>,
    dev: Option<Bme680<I2cDevice<'a, B>, StdDelay>>,
    delay: StdDelay,
    conf: Conf,
    heatr: HeatrConf,
    ambient_temp: i8,
}

impl<B: I2c> Default for Bme680Driver<'_, B> {
    fn default() -> Self {
        Self {
            addr: 0,
            transport: None,
            dev: None,
            delay: StdDelay,
            conf: Conf::default(),
            heatr: HeatrConf::default(),
            ambient_temp: DEFAULT_AMBIENT_TEMP,
        }
    }
}

fn driver_error<R, W>(e: bme680::Error<R, W>) -> DriverError {
    match e {
        bme680::Error::I2CWrite(_) | bme680::Error::I2CRead(_) => DriverError::ComFail,
        bme680::Error::DeviceNotFound => DriverError::DevNotFound,
        bme680::Error::DefinePwrMode => DriverError::DefineOpMode,
        _ => DriverError::InvalidLength,
    }
}

fn i2c_address(addr: u8) -> I2CAddress {
    match addr {
        BME68X_I2C_ADDR_LOW => I2CAddress::Primary,
        BME68X_I2C_ADDR_HIGH => I2CAddress::Secondary,
        other => I2CAddress::Other(other),
    }
}

fn oversampling(os: Oversampling) -> OversamplingSetting {
    match os {
        Oversampling::None => OversamplingSetting::OSNone,
        Oversampling::X1 => OversamplingSetting::OS1x,
        Oversampling::X2 => OversamplingSetting::OS2x,
        Oversampling::X4 => OversamplingSetting::OS4x,
        Oversampling::X8 => OversamplingSetting::OS8x,
        Oversampling::X16 => OversamplingSetting::OS16x,
    }
}

fn filter(filter: Filter) -> IIRFilterSize {
    match filter {
        Filter::Off => IIRFilterSize::Size0,
        Filter::Size1 => IIRFilterSize::Size1,
        Filter::Size3 => IIRFilterSize::Size3,
        Filter::Size7 => IIRFilterSize::Size7,
        Filter::Size15 => IIRFilterSize::Size15,
        Filter::Size31 => IIRFilterSize::Size31,
        Filter::Size63 => IIRFilterSize::Size63,
        Filter::Size127 => IIRFilterSize::Size127,
    }
}

fn settings(conf: &Conf, heatr: Option<&HeatrConf>, ambient_temp: i8) -> Settings {
    let builder = SettingsBuilder::new()
        .with_humidity_oversampling(oversampling(conf.os_hum))
        .with_temperature_oversampling(oversampling(conf.os_temp))
        .with_pressure_oversampling(oversampling(conf.os_pres))
        .with_temperature_filter(filter(conf.filter));
    let builder = match heatr {
        Some(h) if h.enable => builder
            .with_gas_measurement(Duration::from_millis(h.heatr_dur as u64), h.heatr_temp, ambient_temp)
            .with_run_gas(true),
        _ => builder.with_run_gas(false),
    };
    builder.build()
}

fn power_mode(mode: OpMode) -> DriverResult<PowerMode> {
    match mode {
        OpMode::Sleep => Ok(PowerMode::SleepMode),
        OpMode::Forced => Ok(PowerMode::ForcedMode),
        OpMode::Parallel | OpMode::Sequential => Err(DriverError::DefineOpMode),
    }
}

/// Plausibility of a hot and a cold heater measurement taken at room conditions
fn check_selftest(hot: &FieldData, cold: &FieldData) -> DriverResult<()> {
    let in_range = |v: f32, min: f32, max: f32| (min..=max).contains(&v);
    if !in_range(hot.temperature, MIN_TEMPERATURE, MAX_TEMPERATURE)
        || !in_range(hot.pressure, MIN_PRESSURE, MAX_PRESSURE)
        || !in_range(hot.humidity, MIN_HUMIDITY, MAX_HUMIDITY)
    {
        warn!(
            "[bme68x] self test out of range: {:.2} degC, {:.0} Pa, {:.2} %RH",
            hot.temperature, hot.pressure, hot.humidity
        );
        return Err(DriverError::SelfTest);
    }
    if hot.gas_resistance <= 0.0 || cold.gas_resistance <= hot.gas_resistance {
        warn!(
            "[bme68x] self test gas resistance: hot {:.0} ohm, cold {:.0} ohm",
            hot.gas_resistance, cold.gas_resistance
        );
        return Err(DriverError::SelfTest);
    }
    Ok(())
}

impl<'a, B: I2c> Bme680Driver<'a, B> {
    fn dev(&mut self) -> DriverResult<&mut Bme680<I2cDevice<'a, B>, StdDelay>> {
        self.dev.as_mut().ok_or(DriverError::NullPtr)
    }

    fn apply_settings(&mut self) -> DriverResult<()> {
        let settings = settings(&self.conf, Some(&self.heatr), self.ambient_temp);
        let dev = self.dev.as_mut().ok_or(DriverError::NullPtr)?;
        dev.set_sensor_settings(&mut self.delay, settings).map_err(driver_error)
    }

    fn forced_sample(&mut self, heatr: HeatrConf) -> DriverResult<FieldData> {
        self.heatr = heatr;
        self.apply_settings()?;
        self.set_op_mode(OpMode::Forced)?;
        let profile = settings(&self.conf, Some(&self.heatr), self.ambient_temp);
        let wait = self.dev()?.get_profile_dur(&profile.0).map_err(driver_error)?;
        thread::sleep(wait);
        self.get_data(OpMode::Forced)?
            .into_iter()
            .next()
            .ok_or(DriverError::SelfTest)
    }

    fn run_selftest(&mut self) -> DriverResult<()> {
        self.conf = Conf {
            os_hum: Oversampling::X1,
            os_temp: Oversampling::X2,
            os_pres: Oversampling::X16,
            filter: Filter::Off,
            ..Conf::default()
        };
        let hot = self.forced_sample(HeatrConf {
            enable: true,
            heatr_temp: SELFTEST_HOT_TEMP,
            heatr_dur: SELFTEST_HOT_DUR,
        })?;
        let cold = self.forced_sample(HeatrConf {
            enable: true,
            heatr_temp: SELFTEST_COLD_TEMP,
            heatr_dur: SELFTEST_COLD_DUR,
        })?;
        check_selftest(&hot, &cold)
    }
}

impl<'a, B: I2c> Bme68xApi for Bme680Driver<'a, B> {
    type Transport = I2cDevice<'a, B>;

    fn interface_init(&mut self, intf: Interface, addr: u8, transport: Self::Transport) -> DriverResult<()> {
        if intf != Interface::I2c {
            return Err(DriverError::ComFail);
        }
        self.addr = addr;
        self.transport = Some(transport);
        Ok(())
    }

    fn init(&mut self) -> DriverResult<()> {
        let transport = self.transport.ok_or(DriverError::NullPtr)?;
        let dev = Bme680::init(transport, &mut self.delay, i2c_address(self.addr)).map_err(driver_error)?;
        self.dev = Some(dev);
        info!("[bme68x] bme680 driver initialized at {:#04x}", self.addr);
        Ok(())
    }

    fn selftest_check(&mut self) -> DriverResult<()> {
        let (conf, heatr) = (self.conf, self.heatr);
        let result = self.run_selftest();
        self.conf = conf;
        self.heatr = heatr;
        // Writing settings leaves the device in forced mode, so sleep comes last
        let restored = self
            .apply_settings()
            .and_then(|_| self.set_op_mode(OpMode::Sleep));
        result.and(restored)
    }

    fn set_conf(&mut self, conf: &Conf) -> DriverResult<()> {
        self.conf = *conf;
        self.apply_settings()
    }

    fn set_heatr_conf(&mut self, mode: OpMode, conf: &HeatrConf) -> DriverResult<()> {
        if mode != OpMode::Forced {
            return Err(DriverError::DefineOpMode);
        }
        self.heatr = *conf;
        self.apply_settings()
    }

    fn set_op_mode(&mut self, mode: OpMode) -> DriverResult<()> {
        let target = power_mode(mode)?;
        let dev = self.dev.as_mut().ok_or(DriverError::NullPtr)?;
        dev.set_sensor_mode(&mut self.delay, target).map_err(driver_error)
    }

    fn get_op_mode(&mut self) -> DriverResult<OpMode> {
        match self.dev()?.get_sensor_mode().map_err(driver_error)? {
            PowerMode::SleepMode => Ok(OpMode::Sleep),
            PowerMode::ForcedMode => Ok(OpMode::Forced),
        }
    }

    fn get_meas_dur(&mut self, mode: OpMode, conf: &Conf) -> DriverResult<Duration> {
        power_mode(mode)?;
        let profile = settings(conf, None, self.ambient_temp);
        self.dev()?.get_profile_dur(&profile.0).map_err(driver_error)
    }

    fn get_data(&mut self, mode: OpMode) -> DriverResult<Vec<FieldData>> {
        if mode != OpMode::Forced {
            return Err(DriverError::DefineOpMode);
        }
        let dev = self.dev.as_mut().ok_or(DriverError::NullPtr)?;
        let (data, condition) = dev.get_sensor_data(&mut self.delay).map_err(driver_error)?;
        match condition {
            FieldDataCondition::Unchanged => {
                debug!("[bme68x] no new data");
                Ok(Vec::new())
            }
            FieldDataCondition::NewData => {
                let gas_resistance = data.gas_resistance_ohm() as f32;
                // The crate does not expose the status register; a reported
                // resistance stands in for the gas valid and heat stable bits.
                let gas_ok = self.heatr.enable && gas_resistance > 0.0;
                let fields = FieldData {
                    status: field_status(true, gas_ok, gas_ok),
                    temperature: data.temperature_celsius(),
                    pressure: data.pressure_hpa() * 100.0,
                    humidity: data.humidity_percent(),
                    gas_resistance,
                };
                self.ambient_temp = fields.temperature.clamp(i8::MIN as f32, i8::MAX as f32) as i8;
                Ok(vec![fields])
            }
        }
    }
}
