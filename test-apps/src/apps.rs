use crate::context::TestContext;
use crate::errors::{AppError, AppResult};
use bme68x_i2c::driver::{check_rslt, Conf, FieldData, HeatrConf, OpMode};
use bme68x_i2c::{Bme68xApi, DriverResult, I2cBus, I2cDevice, SensorEntry, BME68X_I2C_ADDR_HIGH, BME68X_I2C_ADDR_LOW};
use embedded_hal::i2c::I2c;
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Scan,
    SelfTest,
    Sample,
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scan" => Ok(Command::Scan),
            "selftest" | "self-test" => Ok(Command::SelfTest),
            "sample" => Ok(Command::Sample),
            _ => Err(AppError::InvalidArgument {
                name: "command",
                value: s.to_string(),
            }),
        }
    }
}

/// Log the driver outcome and lift it into an application error
fn driver_call<T>(api: &'static str, rslt: DriverResult<T>) -> AppResult<T> {
    check_rslt(api, &rslt);
    rslt.map_err(|source| AppError::Driver { api, source })
}

/// Probe every 7-bit address on the bus and log the ones that answer
pub fn bus_scan<B: I2c>(bus: &I2cBus<B>) -> Vec<u8> {
    info!("[test_app] Scanning {}", bus.id());
    let found = bus.scan();
    for addr in &found {
        if *addr == BME68X_I2C_ADDR_LOW || *addr == BME68X_I2C_ADDR_HIGH {
            info!("[test_app] {:#04x} (BME68x address)", addr);
        } else {
            info!("[test_app] {:#04x}", addr);
        }
    }
    if found.is_empty() {
        warn!("[test_app] No device answered on {}", bus.id());
    }
    found
}

pub fn run_self_test<D: Bme68xApi>(bme: &mut D) -> AppResult<()> {
    match bme.selftest_check() {
        Ok(()) => {
            info!("[test_app] Self test passed");
            Ok(())
        }
        Err(source) => {
            error!("[test_app] Self test failed with code {}: {}", source.code(), source);
            Err(AppError::Driver {
                api: "bme68x_selftest_check",
                source,
            })
        }
    }
}

/// Create the sensor, self test it, delete it
pub fn self_test<'a, B, D>(ctx: &'a TestContext<B>) -> AppResult<()>
where
    B: I2c,
    D: Bme68xApi<Transport = I2cDevice<'a, B>>,
{
    let mut sensor = ctx.create_sensor::<D>()?;
    let outcome = run_self_test(&mut *sensor);
    sensor.delete()?;
    outcome
}

/// Apply the oversampling, filter and heater settings for forced mode
pub fn configure<D: Bme68xApi>(bme: &mut D, conf: &Conf, heatr: &HeatrConf) -> AppResult<()> {
    driver_call("bme68x_set_conf", bme.set_conf(conf))?;
    driver_call("bme68x_set_heatr_conf", bme.set_heatr_conf(OpMode::Forced, heatr))?;
    Ok(())
}

/// Trigger one forced measurement and fetch its field sets
pub async fn sample_forced<D: Bme68xApi>(bme: &mut D, conf: &Conf, heatr: &HeatrConf) -> AppResult<Vec<FieldData>> {
    driver_call("bme68x_set_op_mode", bme.set_op_mode(OpMode::Forced))?;
    let mut wait = driver_call("bme68x_get_meas_dur", bme.get_meas_dur(OpMode::Forced, conf))?;
    if heatr.enable {
        wait += Duration::from_millis(heatr.heatr_dur as u64);
    }
    tokio::time::sleep(wait).await;
    driver_call("bme68x_get_data", bme.get_data(OpMode::Forced))
}

/// One output line of the `sample` command
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub sensor_id: String,
    pub seq: u64,
    /// UTC timestamp in milliseconds
    pub t_utc_ms: u64,
    pub temperature_c: f32,
    pub pressure_pa: f32,
    pub humidity_pct: f32,
    pub gas_resistance_ohm: f32,
    pub gas_valid: bool,
    pub heat_stable: bool,
}

impl SampleRecord {
    pub fn new(sensor_id: &str, seq: u64, data: &FieldData) -> Self {
        let t_utc_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            sensor_id: sensor_id.to_string(),
            seq,
            t_utc_ms,
            temperature_c: data.temperature,
            pressure_pa: data.pressure,
            humidity_pct: data.humidity,
            gas_resistance_ohm: data.gas_resistance,
            gas_valid: data.gas_valid(),
            heat_stable: data.heat_stable(),
        }
    }
}

/// Forced mode sampling at the entry's frequency
///
/// Stops after `max_samples` records when set, or once `stop` completes
/// (Ctrl-C in the binary). Every record is written to `out` as one JSON
/// line. Returns the number of records written.
pub async fn sampling_loop<D, W, F>(
    bme: &mut D,
    entry: &SensorEntry,
    max_samples: Option<u64>,
    out: &mut W,
    stop: F,
) -> AppResult<u64>
where
    D: Bme68xApi,
    W: Write,
    F: Future<Output = ()>,
{
    let conf = entry.measurement.conf()?;
    let heatr = entry.measurement.heatr_conf()?;
    configure(bme, &conf, &heatr)?;

    let period = entry.sample_period();
    info!("[test_app] Sampling {} every {:?}", entry.id, period);

    tokio::pin!(stop);

    let mut seq = 0u64;
    loop {
        if max_samples.is_some_and(|max| seq >= max) {
            break;
        }

        for data in sample_forced(bme, &conf, &heatr).await? {
            if !data.is_new_data() {
                continue;
            }
            seq += 1;
            let record = SampleRecord::new(&entry.id, seq, &data);
            serde_json::to_writer(&mut *out, &record)?;
            writeln!(out)?;
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = &mut stop => {
                info!("[test_app] Interrupted");
                break;
            }
        }
    }

    info!("[test_app] {} samples from {}", seq, entry.id);
    Ok(seq)
}

/// Create the sensor, run the sampling loop to stdout, delete it
pub async fn sample<'a, B, D, F>(ctx: &'a TestContext<B>, max_samples: Option<u64>, stop: F) -> AppResult<u64>
where
    B: I2c,
    D: Bme68xApi<Transport = I2cDevice<'a, B>>,
    F: Future<Output = ()>,
{
    let mut sensor = ctx.create_sensor::<D>()?;
    let mut stdout = std::io::stdout().lock();
    let outcome = sampling_loop(&mut *sensor, ctx.sensor(), max_samples, &mut stdout, stop).await;
    sensor.delete()?;
    outcome
}
