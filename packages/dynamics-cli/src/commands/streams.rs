use super::{connect, finish};
use crate::cli::{Globals, StreamsArgs};
use crate::output;
use dynamics_api::{ClientConfig, ModuleStatus, StreamDescriptor};
use serde::Serialize;
use tracing::warn;

#[derive(Serialize)]
struct StreamsReport<'a> {
    device: String,
    firmware: String,
    dynamics_status: Option<ModuleStatus>,
    streams: &'a [StreamDescriptor],
}

pub fn execute(globals: &Globals, args: StreamsArgs) -> i32 {
    finish(run(globals, args))
}

fn run(globals: &Globals, args: StreamsArgs) -> anyhow::Result<()> {
    let (_registry, device) = connect(globals, ClientConfig::from_env()?)?;

    let dynamics_status = match device.dynamics_status() {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("Could not query dynamics module status: {}", e);
            None
        }
    };
    let report = StreamsReport {
        device: device.address().to_string(),
        firmware: device.firmware_version().to_string(),
        dynamics_status,
        streams: device.list_streams(),
    };

    if args.json {
        println!("{}", output::to_json(&report, false).map_err(anyhow::Error::msg)?);
        return Ok(());
    }

    println!("Device {} (firmware {})", report.device, report.firmware);
    match report.dynamics_status {
        Some(status) => println!("Dynamics module: {}\n", status),
        None => println!("Dynamics module: unknown\n"),
    }
    println!("  {:<24} {:<16}", "Stream", "Message type");
    println!("  {}", "-".repeat(40));
    for stream in report.streams {
        println!("  {:<24} {:<16}", stream.name, stream.message_type);
    }
    Ok(())
}
