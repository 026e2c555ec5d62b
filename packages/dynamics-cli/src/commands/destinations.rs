use super::{connect, finish};
use crate::cli::{DestinationsArgs, Globals};
use crate::output;
use anyhow::Context;
use dynamics_api::ClientConfig;

pub fn execute(globals: &Globals, args: DestinationsArgs) -> i32 {
    finish(run(globals, args))
}

fn run(globals: &Globals, args: DestinationsArgs) -> anyhow::Result<()> {
    let (_registry, device) = connect(globals, ClientConfig::from_env()?)?;
    let destinations = device
        .get_destinations(&args.stream)
        .with_context(|| format!("Could not list destinations of stream '{}'", args.stream))?;

    if args.json {
        println!(
            "{}",
            output::to_json(&destinations, false).map_err(anyhow::Error::msg)?
        );
    } else if destinations.is_empty() {
        println!("Stream '{}' has no destinations", args.stream);
    } else {
        for destination in destinations {
            println!("{}", destination);
        }
    }
    Ok(())
}
