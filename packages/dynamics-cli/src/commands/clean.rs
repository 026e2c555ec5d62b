use super::{connect, finish};
use crate::cli::{CleanArgs, Globals};
use crate::exit_codes;
use crate::output;
use dynamics_api::net::local_ipv4_addresses;
use dynamics_api::{ClientConfig, ReconcileMode, ReconcileReport};

pub fn execute(globals: &Globals, args: CleanArgs) -> i32 {
    match run(globals, args) {
        Ok(report) => outcome_code(&report),
        Err(e) => finish(Err(e)),
    }
}

/// Anything left on the device is a partial failure.
fn outcome_code(report: &ReconcileReport) -> i32 {
    if report.is_clean() {
        exit_codes::SUCCESS
    } else {
        exit_codes::PARTIAL_FAILURE
    }
}

fn run(globals: &Globals, args: CleanArgs) -> anyhow::Result<ReconcileReport> {
    let config = ClientConfig {
        reconcile: ReconcileMode::Off,
        ..ClientConfig::from_env()?
    };
    let (_registry, device) = connect(globals, config)?;
    let report = device.reconcile(&local_ipv4_addresses(), ReconcileMode::Remove)?;

    if args.json {
        println!("{}", output::to_json(&report, false).map_err(anyhow::Error::msg)?);
    } else if report.removed.is_empty() && report.remaining.is_empty() {
        println!("No destinations of this host found on {}", device.address());
    } else {
        for entry in &report.removed {
            println!("removed   {}", entry);
        }
        for entry in &report.remaining {
            println!("remaining {}", entry);
        }
    }

    if !report.is_clean() {
        eprintln!(
            "Error: {} destination(s) could not be removed from {}",
            report.remaining.len(),
            device.address()
        );
    }
    Ok(report)
}
