use super::{connect, finish};
use crate::cli::{Globals, StreamArgs};
use crate::output::LineWriter;
use anyhow::Context;
use dynamics_api::{ClientConfig, ConfigError, DeviceClient};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub fn execute(globals: &Globals, args: StreamArgs) -> i32 {
    finish(run(globals, args))
}

fn run(globals: &Globals, args: StreamArgs) -> anyhow::Result<()> {
    let duration = args
        .duration
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "--duration must be a non-negative number of seconds (got {})",
                    secs
                ))
            })
        })
        .transpose()?;

    let mut writer = LineWriter::open(args.output.as_deref()).map_err(anyhow::Error::msg)?;
    let (_registry, device) = connect(globals, ClientConfig::from_env()?)?;

    if args.autostart {
        let state = device
            .start()
            .context("Could not start the dynamics module")?;
        info!("Dynamics module entered state {}", state);
    }

    let result = record(&device, &args, duration, &mut writer);

    if args.autostart {
        match device.stop() {
            Ok(state) => info!("Dynamics module entered state {}", state),
            Err(e) => warn!("Could not stop the dynamics module: {}", e),
        }
    }
    result
}

fn record(
    device: &std::sync::Arc<DeviceClient>,
    args: &StreamArgs,
    duration: Option<Duration>,
    writer: &mut LineWriter,
) -> anyhow::Result<()> {
    let mut options = device.session_options().with_port(args.port);
    if let Some(interface) = &args.interface {
        options = options.with_interface(interface.clone());
    }
    let mut session = device
        .create_session(&args.stream, options)
        .with_context(|| format!("Could not open stream '{}'", args.stream))?;

    let deadline = duration.map(|d| Instant::now() + d);
    let mut received: u64 = 0;
    loop {
        if args.count.is_some_and(|count| received >= count) {
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        match session.receive()? {
            Some(record) => {
                writer.write_json(&record).map_err(anyhow::Error::msg)?;
                received += 1;
            }
            None => debug!("No record from '{}' within poll timeout", args.stream),
        }
    }

    info!("Received {} record(s) from '{}'", received, args.stream);
    session.close()?;
    Ok(())
}
