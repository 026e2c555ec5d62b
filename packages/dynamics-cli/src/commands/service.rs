use super::{connect, finish};
use crate::cli::{Globals, ServiceArgs};
use crate::output;
use dynamics_api::ClientConfig;
use std::time::Duration;

pub fn execute(globals: &Globals, args: ServiceArgs) -> i32 {
    finish(run(globals, args))
}

fn run(globals: &Globals, args: ServiceArgs) -> anyhow::Result<()> {
    let (_registry, device) = connect(globals, ClientConfig::from_env()?)?;

    if !args.long_running {
        let state = device.call_module_service(&args.module, &args.name)?;
        println!("{}", state);
        return Ok(());
    }

    let timeout = args.wait_ms.map(Duration::from_millis);
    let code = device.call_long_running_service(&args.module, &args.name, timeout)?;
    println!("{}", output::to_json(&code, false).map_err(anyhow::Error::msg)?);
    if !code.is_success() {
        anyhow::bail!(
            "Service {}/{} failed with return code {}: {}",
            args.module,
            args.name,
            code.value,
            code.message
        );
    }
    Ok(())
}
