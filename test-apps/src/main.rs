use bme68x_i2c::hal::I2CDevice;
use bme68x_i2c::{init_tracing, Bme680Driver};
use bme68x_test_apps::{
    bus_scan, get_config_path, get_max_samples, get_sensor_id, sample, self_test, Command, CountingAlloc,
    TestContext, APP_NAME,
};
use tokio::signal::unix::{signal, SignalKind};

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

type Driver<'a> = Bme680Driver<'a, I2CDevice>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let command = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<Command>()?,
        None => Command::SelfTest,
    };
    let max_samples = get_max_samples()?;

    let config_path = get_config_path();
    tracing::info!("[{}] Configuration path: {}", APP_NAME, config_path);

    // Signal handling stays registered for the whole process, so it must
    // exist before setup takes its heap snapshot
    let mut interrupt = signal(SignalKind::interrupt())?;

    let sensor_id = get_sensor_id();
    let ctx = TestContext::setup(&config_path, sensor_id.as_deref())?;

    let outcome = match command {
        Command::Scan => {
            bus_scan(ctx.bus());
            Ok(())
        }
        Command::SelfTest => self_test::<_, Driver>(&ctx),
        Command::Sample => {
            let stop = async {
                interrupt.recv().await;
            };
            sample::<_, Driver, _>(&ctx, max_samples, stop).await.map(|_| ())
        }
    };

    // Teardown runs even when the command failed
    let teardown = ctx.teardown();
    outcome?;
    teardown?;

    tracing::info!("[{}] {:?} done", APP_NAME, command);
    Ok(())
}
